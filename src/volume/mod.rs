//! Volume API
//!
//! Each operation wraps a single [`VolumeOsApi`] call. Versions share request
//! and response shapes and differ only in default handling: under `v1beta1`
//! a resize must name a size, under `v1` a size of 0 grows the volume to its
//! maximum.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::Registry;
use crate::error::ProxyError;
use crate::os::{OsError, VolumeOsApi};

pub const LIST_VOLUMES_ON_DISK: &str = "ListVolumesOnDisk";
pub const IS_VOLUME_FORMATTED: &str = "IsVolumeFormatted";
pub const FORMAT_VOLUME: &str = "FormatVolume";
pub const MOUNT_VOLUME: &str = "MountVolume";
pub const UNMOUNT_VOLUME: &str = "UnmountVolume";
pub const RESIZE_VOLUME: &str = "ResizeVolume";
pub const GET_VOLUME_STATS: &str = "GetVolumeStats";
pub const WRITE_VOLUME_CACHE: &str = "WriteVolumeCache";
pub const GET_DISK_NUMBER_FROM_VOLUME_ID: &str = "GetDiskNumberFromVolumeId";
pub const GET_VOLUME_ID_FROM_TARGET_PATH: &str = "GetVolumeIdFromTargetPath";

/// Versions served by the volume API
pub const VERSIONS: [&str; 2] = ["v1beta1", "v1"];

/// Filesystem used when a format request names none
pub const DEFAULT_FILESYSTEM: &str = "NTFS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListVolumesOnDiskRequest {
    pub disk_number: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListVolumesOnDiskResponse {
    pub volume_ids: Vec<String>,
}

/// Request naming a single volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeIdRequest {
    pub volume_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsVolumeFormattedResponse {
    pub formatted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatVolumeRequest {
    pub volume_id: String,

    #[serde(default)]
    pub filesystem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountVolumeRequest {
    pub volume_id: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeVolumeRequest {
    pub volume_id: String,

    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVolumeStatsResponse {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDiskNumberFromVolumeIdResponse {
    pub disk_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVolumeIdFromTargetPathRequest {
    pub target_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVolumeIdFromTargetPathResponse {
    pub volume_id: String,
}

/// Empty response for operations that only signal success
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

/// How a resize request with `size_bytes == 0` is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Zero is invalid
    RequireSize,
    /// Zero means grow to the maximum supported size
    ZeroMeansMaximum,
}

impl ResizePolicy {
    fn for_version(version: &str) -> Self {
        match version {
            "v1beta1" => ResizePolicy::RequireSize,
            _ => ResizePolicy::ZeroMeansMaximum,
        }
    }
}

/// Thin adapter over [`VolumeOsApi`]
pub struct VolumeService {
    api: Arc<dyn VolumeOsApi>,
}

impl VolumeService {
    pub fn new(api: Arc<dyn VolumeOsApi>) -> Self {
        Self { api }
    }

    /// Volumes on a disk. An unknown disk is a lookup failure; a known disk may have none.
    pub fn list_volumes_on_disk(&self, disk_number: u32) -> Result<Vec<String>, ProxyError> {
        self.api
            .list_volumes_on_disk(disk_number)
            .map_err(|e| match e {
                OsError::NotFound(_) => ProxyError::DiskLookupFailed(e),
                _ => ProxyError::VolumeOperationFailed(e),
            })
    }

    pub fn is_volume_formatted(&self, volume_id: &str) -> Result<bool, ProxyError> {
        require("volume_id", volume_id)?;
        self.api
            .is_volume_formatted(volume_id)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn format_volume(&self, volume_id: &str, filesystem: Option<&str>) -> Result<(), ProxyError> {
        require("volume_id", volume_id)?;
        let filesystem = filesystem
            .filter(|fs| !fs.is_empty())
            .unwrap_or(DEFAULT_FILESYSTEM);
        log::info!("Formatting volume {} as {}", volume_id, filesystem);
        self.api
            .format_volume(volume_id, filesystem)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn mount_volume(&self, volume_id: &str, target_path: &str) -> Result<(), ProxyError> {
        require("volume_id", volume_id)?;
        require("target_path", target_path)?;
        log::info!("Mounting volume {} at {}", volume_id, target_path);
        self.api
            .mount_volume(volume_id, target_path)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn unmount_volume(&self, volume_id: &str, target_path: &str) -> Result<(), ProxyError> {
        require("volume_id", volume_id)?;
        require("target_path", target_path)?;
        log::info!("Unmounting volume {} from {}", volume_id, target_path);
        self.api
            .unmount_volume(volume_id, target_path)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn resize_volume(
        &self,
        volume_id: &str,
        size_bytes: u64,
        policy: ResizePolicy,
    ) -> Result<(), ProxyError> {
        require("volume_id", volume_id)?;
        if size_bytes == 0 && policy == ResizePolicy::RequireSize {
            return Err(ProxyError::InvalidArgument(
                "size_bytes must be greater than 0".to_string(),
            ));
        }
        log::info!("Resizing volume {} to {} bytes", volume_id, size_bytes);
        self.api
            .resize_volume(volume_id, size_bytes)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn get_volume_stats(&self, volume_id: &str) -> Result<GetVolumeStatsResponse, ProxyError> {
        require("volume_id", volume_id)?;
        let stats = self
            .api
            .get_volume_stats(volume_id)
            .map_err(ProxyError::VolumeOperationFailed)?;
        Ok(GetVolumeStatsResponse {
            total_bytes: stats.total_bytes,
            used_bytes: stats.used_bytes,
        })
    }

    pub fn write_volume_cache(&self, volume_id: &str) -> Result<(), ProxyError> {
        require("volume_id", volume_id)?;
        self.api
            .write_volume_cache(volume_id)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn get_disk_number_from_volume_id(&self, volume_id: &str) -> Result<u32, ProxyError> {
        require("volume_id", volume_id)?;
        self.api
            .get_disk_number_from_volume_id(volume_id)
            .map_err(ProxyError::VolumeOperationFailed)
    }

    pub fn get_volume_id_from_target_path(&self, target_path: &str) -> Result<String, ProxyError> {
        require("target_path", target_path)?;
        self.api
            .get_volume_id_from_target_path(target_path)
            .map_err(ProxyError::VolumeOperationFailed)
    }
}

fn require(field: &str, value: &str) -> Result<(), ProxyError> {
    if value.trim().is_empty() {
        return Err(ProxyError::InvalidArgument(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Register every volume operation for every supported version
pub fn register(service: Arc<VolumeService>, registry: &mut Registry) -> Result<(), ProxyError> {
    for version in VERSIONS {
        let s = Arc::clone(&service);
        registry.register(LIST_VOLUMES_ON_DISK, version, move |req: ListVolumesOnDiskRequest| {
            Ok(ListVolumesOnDiskResponse {
                volume_ids: s.list_volumes_on_disk(req.disk_number)?,
            })
        })?;

        let s = Arc::clone(&service);
        registry.register(IS_VOLUME_FORMATTED, version, move |req: VolumeIdRequest| {
            Ok(IsVolumeFormattedResponse {
                formatted: s.is_volume_formatted(&req.volume_id)?,
            })
        })?;

        let s = Arc::clone(&service);
        registry.register(FORMAT_VOLUME, version, move |req: FormatVolumeRequest| {
            s.format_volume(&req.volume_id, req.filesystem.as_deref())?;
            Ok(Empty {})
        })?;

        let s = Arc::clone(&service);
        registry.register(MOUNT_VOLUME, version, move |req: MountVolumeRequest| {
            s.mount_volume(&req.volume_id, &req.target_path)?;
            Ok(Empty {})
        })?;

        let s = Arc::clone(&service);
        registry.register(UNMOUNT_VOLUME, version, move |req: MountVolumeRequest| {
            s.unmount_volume(&req.volume_id, &req.target_path)?;
            Ok(Empty {})
        })?;

        let s = Arc::clone(&service);
        let policy = ResizePolicy::for_version(version);
        registry.register(RESIZE_VOLUME, version, move |req: ResizeVolumeRequest| {
            s.resize_volume(&req.volume_id, req.size_bytes, policy)?;
            Ok(Empty {})
        })?;

        let s = Arc::clone(&service);
        registry.register(GET_VOLUME_STATS, version, move |req: VolumeIdRequest| {
            s.get_volume_stats(&req.volume_id)
        })?;

        let s = Arc::clone(&service);
        registry.register(WRITE_VOLUME_CACHE, version, move |req: VolumeIdRequest| {
            s.write_volume_cache(&req.volume_id)?;
            Ok(Empty {})
        })?;

        let s = Arc::clone(&service);
        registry.register(
            GET_DISK_NUMBER_FROM_VOLUME_ID,
            version,
            move |req: VolumeIdRequest| {
                Ok(GetDiskNumberFromVolumeIdResponse {
                    disk_number: s.get_disk_number_from_volume_id(&req.volume_id)?,
                })
            },
        )?;

        let s = Arc::clone(&service);
        registry.register(
            GET_VOLUME_ID_FROM_TARGET_PATH,
            version,
            move |req: GetVolumeIdFromTargetPathRequest| {
                Ok(GetVolumeIdFromTargetPathResponse {
                    volume_id: s.get_volume_id_from_target_path(&req.target_path)?,
                })
            },
        )?;
    }
    Ok(())
}
