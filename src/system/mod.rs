//! System API
//!
//! Host service control. The iSCSI initiator service (`MSiSCSI`) is stopped on
//! a fresh Windows host, so callers start it here before any iSCSI operation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::Registry;
use crate::error::ProxyError;
use crate::os::{ServiceInfo, SystemOsApi};

pub const GET_SERVICE: &str = "GetService";
pub const START_SERVICE: &str = "StartService";
pub const STOP_SERVICE: &str = "StopService";

/// Versions served by the system API
pub const VERSIONS: [&str; 2] = ["v1alpha1", "v1"];

/// Name of the Windows iSCSI initiator service
pub const ISCSI_INITIATOR_SERVICE: &str = "MSiSCSI";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Unknown,
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartType {
    Unknown,
    Boot,
    System,
    Automatic,
    Manual,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServiceRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetServiceResponse {
    pub display_name: String,
    pub start_type: StartType,
    pub status: ServiceStatus,
}

impl From<ServiceInfo> for GetServiceResponse {
    fn from(info: ServiceInfo) -> Self {
        Self {
            display_name: info.display_name,
            start_type: info.start_type,
            status: info.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartServiceRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartServiceResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopServiceRequest {
    pub name: String,
    /// Also stop services that depend on this one
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopServiceResponse {}

fn check_name(name: &str) -> Result<(), ProxyError> {
    if name.trim().is_empty() {
        return Err(ProxyError::InvalidArgument(
            "service name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Thin adapter over [`SystemOsApi`]
pub struct SystemService {
    api: Arc<dyn SystemOsApi>,
}

impl SystemService {
    pub fn new(api: Arc<dyn SystemOsApi>) -> Self {
        Self { api }
    }

    pub fn get_service(&self, name: &str) -> Result<ServiceInfo, ProxyError> {
        check_name(name)?;
        self.api
            .get_service(name)
            .map_err(ProxyError::ServiceOperationFailed)
    }

    /// Start a service. Starting a running service is a no-op.
    pub fn start_service(&self, name: &str) -> Result<(), ProxyError> {
        check_name(name)?;
        log::info!("Starting service {}", name);
        self.api
            .start_service(name)
            .map_err(ProxyError::ServiceOperationFailed)
    }

    pub fn stop_service(&self, name: &str, force: bool) -> Result<(), ProxyError> {
        check_name(name)?;
        log::info!("Stopping service {}{}", name, if force { " (forced)" } else { "" });
        self.api
            .stop_service(name, force)
            .map_err(ProxyError::ServiceOperationFailed)
    }
}

/// Register every system operation for every supported version
pub fn register(service: Arc<SystemService>, registry: &mut Registry) -> Result<(), ProxyError> {
    for version in VERSIONS {
        let s = Arc::clone(&service);
        registry.register(GET_SERVICE, version, move |req: GetServiceRequest| {
            Ok(GetServiceResponse::from(s.get_service(&req.name)?))
        })?;

        let s = Arc::clone(&service);
        registry.register(START_SERVICE, version, move |req: StartServiceRequest| {
            s.start_service(&req.name)?;
            Ok(StartServiceResponse {})
        })?;

        let s = Arc::clone(&service);
        registry.register(STOP_SERVICE, version, move |req: StopServiceRequest| {
            s.stop_service(&req.name, req.force)?;
            Ok(StopServiceResponse {})
        })?;
    }
    Ok(())
}
