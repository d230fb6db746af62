//! Disk API
//!
//! Online/offline transitions and partitioning for a disk number.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::Registry;
use crate::error::ProxyError;
use crate::os::DiskOsApi;

pub const GET_DISK_STATE: &str = "GetDiskState";
pub const SET_DISK_STATE: &str = "SetDiskState";
pub const PARTITION_DISK: &str = "PartitionDisk";

/// Versions served by the disk API
pub const VERSIONS: [&str; 2] = ["v1beta1", "v1"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDiskStateRequest {
    pub disk_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDiskStateResponse {
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDiskStateRequest {
    pub disk_number: u32,
    pub is_online: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetDiskStateResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDiskRequest {
    pub disk_number: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionDiskResponse {}

/// Thin adapter over [`DiskOsApi`]
pub struct DiskService {
    api: Arc<dyn DiskOsApi>,
}

impl DiskService {
    pub fn new(api: Arc<dyn DiskOsApi>) -> Self {
        Self { api }
    }

    pub fn get_disk_state(&self, disk_number: u32) -> Result<bool, ProxyError> {
        self.api
            .get_disk_state(disk_number)
            .map_err(ProxyError::DiskLookupFailed)
    }

    pub fn set_disk_state(&self, disk_number: u32, is_online: bool) -> Result<(), ProxyError> {
        log::info!(
            "Setting disk {} {}",
            disk_number,
            if is_online { "online" } else { "offline" }
        );
        self.api
            .set_disk_state(disk_number, is_online)
            .map_err(ProxyError::DiskStateChangeFailed)
    }

    /// Partition a disk. Partitioning an already partitioned disk is reported, not ignored.
    pub fn partition_disk(&self, disk_number: u32) -> Result<(), ProxyError> {
        log::info!("Partitioning disk {}", disk_number);
        self.api
            .partition_disk(disk_number)
            .map_err(ProxyError::PartitionFailed)
    }
}

/// Register every disk operation for every supported version
pub fn register(service: Arc<DiskService>, registry: &mut Registry) -> Result<(), ProxyError> {
    for version in VERSIONS {
        let s = Arc::clone(&service);
        registry.register(GET_DISK_STATE, version, move |req: GetDiskStateRequest| {
            Ok(GetDiskStateResponse {
                is_online: s.get_disk_state(req.disk_number)?,
            })
        })?;

        let s = Arc::clone(&service);
        registry.register(SET_DISK_STATE, version, move |req: SetDiskStateRequest| {
            s.set_disk_state(req.disk_number, req.is_online)?;
            Ok(SetDiskStateResponse {})
        })?;

        let s = Arc::clone(&service);
        registry.register(PARTITION_DISK, version, move |req: PartitionDiskRequest| {
            s.partition_disk(req.disk_number)?;
            Ok(PartitionDiskResponse {})
        })?;
    }
    Ok(())
}
