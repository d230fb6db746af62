//! OS capability sets
//!
//! The proxy never talks to the operating system directly. Everything it needs
//! from the host is expressed as a narrow trait. The iSCSI, disk, volume and
//! service traits have a PowerShell-backed implementation for real Windows
//! hosts and an in-memory one for tests and dry runs; filesystem calls always
//! go to the local filesystem.

pub mod local;
pub mod memory;
pub mod powershell;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{BackendConfig, BackendKind, MemoryConfig};
use crate::iscsi::{AuthType, TargetPortal};
use crate::system::{ServiceStatus, StartType};

pub use local::LocalFilesystem;
pub use memory::{MemoryIscsi, MemoryService, MemoryStorage, MemorySystem, MemoryTarget};
pub use powershell::PowerShell;

/// Errors reported by the OS layer
#[derive(Debug, Error)]
pub enum OsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failure: {0}")]
    Authentication(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("resource busy: {0}")]
    Busy(String),

    #[error("unexpected output: {0}")]
    Output(String),

    #[error("command failed: {0}")]
    Command(String),
}

/// Result type for OS operations
pub type OsResult<T> = Result<T, OsError>;

/// Credentials handed to the initiator for a single login
#[derive(Clone, Default)]
pub struct ConnectCredentials {
    pub auth_type: AuthType,
    pub username: String,
    pub secret: String,
    /// Initiator-wide mutual secret as it stood when the connect was issued
    pub mutual_secret: Option<String>,
}

impl fmt::Debug for ConnectCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectCredentials")
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("mutual_secret", &self.mutual_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Capacity figures for a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// State of a host service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub display_name: String,
    pub start_type: StartType,
    pub status: ServiceStatus,
}

/// iSCSI initiator operations
pub trait IscsiOsApi: Send + Sync {
    fn add_target_portal(&self, portal: &TargetPortal) -> OsResult<()>;

    /// All registered portals, in whatever order the initiator reports them
    fn list_target_portals(&self) -> OsResult<Vec<TargetPortal>>;

    fn remove_target_portal(&self, portal: &TargetPortal) -> OsResult<()>;

    /// SendTargets discovery; returns target IQNs
    fn discover_target_portal(&self, portal: &TargetPortal) -> OsResult<Vec<String>>;

    fn connect_target(
        &self,
        portal: &TargetPortal,
        iqn: &str,
        credentials: &ConnectCredentials,
    ) -> OsResult<()>;

    fn disconnect_target(&self, portal: &TargetPortal, iqn: &str) -> OsResult<()>;

    /// Disk identifiers exposed by the session for (portal, iqn)
    fn get_target_disks(&self, portal: &TargetPortal, iqn: &str) -> OsResult<Vec<String>>;

    /// Install the initiator-wide mutual CHAP secret
    fn set_mutual_chap_secret(&self, secret: &str) -> OsResult<()>;
}

/// Disk operations
pub trait DiskOsApi: Send + Sync {
    /// Whether the disk is online
    fn get_disk_state(&self, disk_number: u32) -> OsResult<bool>;

    fn set_disk_state(&self, disk_number: u32, is_online: bool) -> OsResult<()>;

    /// Initialize the partition table and create a single data partition
    fn partition_disk(&self, disk_number: u32) -> OsResult<()>;
}

/// Volume operations
pub trait VolumeOsApi: Send + Sync {
    fn list_volumes_on_disk(&self, disk_number: u32) -> OsResult<Vec<String>>;

    fn is_volume_formatted(&self, volume_id: &str) -> OsResult<bool>;

    fn format_volume(&self, volume_id: &str, filesystem: &str) -> OsResult<()>;

    fn mount_volume(&self, volume_id: &str, target_path: &str) -> OsResult<()>;

    fn unmount_volume(&self, volume_id: &str, target_path: &str) -> OsResult<()>;

    /// Resize the volume's partition. A size of 0 grows it to the maximum supported size.
    fn resize_volume(&self, volume_id: &str, size_bytes: u64) -> OsResult<()>;

    fn get_volume_stats(&self, volume_id: &str) -> OsResult<VolumeStats>;

    /// Flush the volume's write cache to stable storage
    fn write_volume_cache(&self, volume_id: &str) -> OsResult<()>;

    fn get_disk_number_from_volume_id(&self, volume_id: &str) -> OsResult<u32>;

    fn get_volume_id_from_target_path(&self, target_path: &str) -> OsResult<String>;
}

/// Host service control
pub trait SystemOsApi: Send + Sync {
    fn get_service(&self, name: &str) -> OsResult<ServiceInfo>;

    /// Start a service. Starting a running service succeeds.
    fn start_service(&self, name: &str) -> OsResult<()>;

    /// Stop a service. `force` also stops services that depend on it.
    fn stop_service(&self, name: &str, force: bool) -> OsResult<()>;
}

/// Filesystem operations on host paths
pub trait FilesystemOsApi: Send + Sync {
    fn path_exists(&self, path: &str) -> OsResult<bool>;

    /// Create a directory and any missing parents
    fn mkdir(&self, path: &str) -> OsResult<()>;

    /// Remove a directory; `force` removes its contents too
    fn rmdir(&self, path: &str, force: bool) -> OsResult<()>;

    /// Create a directory symlink at `target_path` pointing to `source_path`
    fn create_symlink(&self, source_path: &str, target_path: &str) -> OsResult<()>;

    fn is_symlink(&self, path: &str) -> OsResult<bool>;
}

/// The full set of OS capabilities a proxy instance runs against
#[derive(Clone)]
pub struct Backend {
    pub iscsi: Arc<dyn IscsiOsApi>,
    pub disk: Arc<dyn DiskOsApi>,
    pub volume: Arc<dyn VolumeOsApi>,
    pub system: Arc<dyn SystemOsApi>,
    pub filesystem: Arc<dyn FilesystemOsApi>,
}

impl Backend {
    /// Backend that drives the host through PowerShell cmdlets
    pub fn powershell(program: impl Into<String>) -> Self {
        let shell = Arc::new(PowerShell::new(program));
        Self {
            iscsi: shell.clone(),
            disk: shell.clone(),
            volume: shell.clone(),
            system: shell,
            filesystem: Arc::new(LocalFilesystem),
        }
    }

    /// Backend over in-memory simulations, with a default [`MemorySystem`]
    pub fn memory(iscsi: Arc<MemoryIscsi>, storage: Arc<MemoryStorage>) -> Self {
        Self {
            iscsi,
            disk: storage.clone(),
            volume: storage,
            system: Arc::new(MemorySystem::new()),
            filesystem: Arc::new(LocalFilesystem),
        }
    }

    /// Replace the service controller
    pub fn with_system(mut self, system: Arc<dyn SystemOsApi>) -> Self {
        self.system = system;
        self
    }

    /// Build the backend selected by configuration
    pub fn from_config(backend: &BackendConfig, memory: &MemoryConfig) -> Self {
        match backend.kind {
            BackendKind::Powershell => {
                log::info!("Using PowerShell backend ({})", backend.powershell);
                Self::powershell(backend.powershell.clone())
            }
            BackendKind::Memory => {
                log::info!(
                    "Using memory backend ({} target(s), {} disk(s))",
                    memory.target.len(),
                    memory.disk.len()
                );
                Self::memory(
                    Arc::new(MemoryIscsi::from_config(memory)),
                    Arc::new(MemoryStorage::from_config(memory)),
                )
            }
        }
    }
}
