//! Error taxonomy
//!
//! Every failing request yields exactly one [`ProxyError`]. Errors raised by the
//! OS layer are wrapped, never discarded, so callers can still tell an
//! authentication failure from an unreachable portal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::os::OsError;

/// Proxy errors, grouped by the layer that raises them
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("operation {operation} is already registered for version {version}")]
    DuplicateRegistration { operation: String, version: String },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("operation {operation} does not support version {version}")]
    UnsupportedVersion { operation: String, version: String },

    #[error("invalid API version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("target portal operation failed: {0}")]
    PortalOperationFailed(#[source] OsError),

    #[error("target discovery failed: {0}")]
    DiscoveryFailed(#[source] OsError),

    #[error("connect to target failed: {0}")]
    ConnectFailed(#[source] OsError),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[source] OsError),

    #[error("disconnect from target failed: {0}")]
    DisconnectFailed(#[source] OsError),

    #[error("no connected session: {0}")]
    SessionNotFound(#[source] OsError),

    #[error("disk lookup failed: {0}")]
    DiskLookupFailed(#[source] OsError),

    #[error("disk state change failed: {0}")]
    DiskStateChangeFailed(#[source] OsError),

    #[error("partitioning failed: {0}")]
    PartitionFailed(#[source] OsError),

    #[error("volume operation failed: {0}")]
    VolumeOperationFailed(#[source] OsError),

    #[error("service operation failed: {0}")]
    ServiceOperationFailed(#[source] OsError),

    #[error("filesystem operation failed: {0}")]
    FilesystemOperationFailed(#[source] OsError),
}

/// Serializable classification of a [`ProxyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DuplicateRegistration,
    UnknownOperation,
    UnsupportedVersion,
    InvalidVersion,
    InvalidArgument,
    Internal,
    PortalOperationFailed,
    DiscoveryFailed,
    ConnectFailed,
    AuthenticationFailed,
    DisconnectFailed,
    SessionNotFound,
    DiskLookupFailed,
    DiskStateChangeFailed,
    PartitionFailed,
    VolumeOperationFailed,
    ServiceOperationFailed,
    FilesystemOperationFailed,
}

impl ProxyError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::DuplicateRegistration { .. } => ErrorKind::DuplicateRegistration,
            ProxyError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            ProxyError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            ProxyError::InvalidVersion(_) => ErrorKind::InvalidVersion,
            ProxyError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ProxyError::Internal(_) => ErrorKind::Internal,
            ProxyError::PortalOperationFailed(_) => ErrorKind::PortalOperationFailed,
            ProxyError::DiscoveryFailed(_) => ErrorKind::DiscoveryFailed,
            ProxyError::ConnectFailed(_) => ErrorKind::ConnectFailed,
            ProxyError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            ProxyError::DisconnectFailed(_) => ErrorKind::DisconnectFailed,
            ProxyError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            ProxyError::DiskLookupFailed(_) => ErrorKind::DiskLookupFailed,
            ProxyError::DiskStateChangeFailed(_) => ErrorKind::DiskStateChangeFailed,
            ProxyError::PartitionFailed(_) => ErrorKind::PartitionFailed,
            ProxyError::VolumeOperationFailed(_) => ErrorKind::VolumeOperationFailed,
            ProxyError::ServiceOperationFailed(_) => ErrorKind::ServiceOperationFailed,
            ProxyError::FilesystemOperationFailed(_) => ErrorKind::FilesystemOperationFailed,
        }
    }

    /// Underlying OS error, if this error wraps one
    pub fn os_cause(&self) -> Option<&OsError> {
        match self {
            ProxyError::PortalOperationFailed(e)
            | ProxyError::DiscoveryFailed(e)
            | ProxyError::ConnectFailed(e)
            | ProxyError::AuthenticationFailed(e)
            | ProxyError::DisconnectFailed(e)
            | ProxyError::SessionNotFound(e)
            | ProxyError::DiskLookupFailed(e)
            | ProxyError::DiskStateChangeFailed(e)
            | ProxyError::PartitionFailed(e)
            | ProxyError::VolumeOperationFailed(e)
            | ProxyError::ServiceOperationFailed(e)
            | ProxyError::FilesystemOperationFailed(e) => Some(e),
            _ => None,
        }
    }
}
