//! Host-side storage proxy for containerized workloads
//!
//! This crate exposes the host's iSCSI initiator, disks, volumes, services and
//! filesystem as versioned request/response operations. Requests name an
//! operation and an API version; the dispatcher routes them to the handler
//! registered for that pair, and handlers drive the host through a pluggable
//! OS backend.

pub mod api;
pub mod config;
pub mod disk;
pub mod error;
pub mod filesystem;
pub mod iscsi;
pub mod os;
pub mod server;
pub mod system;
pub mod volume;

use std::sync::Arc;

pub use api::{ApiVersion, Dispatcher, Registry};
pub use config::Config;
pub use error::{ErrorKind, ProxyError};
pub use os::{Backend, OsError};

use disk::DiskService;
use filesystem::FilesystemService;
use iscsi::{MutualChapSecret, SessionManager};
use system::SystemService;
use volume::VolumeService;

/// Register every API against `backend` and freeze the result into a dispatcher
pub fn build_dispatcher(
    backend: Backend,
    mutual_secret: MutualChapSecret,
) -> Result<Dispatcher, ProxyError> {
    let mut registry = Registry::new();

    iscsi::register(
        Arc::new(SessionManager::new(backend.iscsi, mutual_secret)),
        &mut registry,
    )?;
    disk::register(Arc::new(DiskService::new(backend.disk)), &mut registry)?;
    volume::register(Arc::new(VolumeService::new(backend.volume)), &mut registry)?;
    system::register(Arc::new(SystemService::new(backend.system)), &mut registry)?;
    filesystem::register(
        Arc::new(FilesystemService::new(backend.filesystem)),
        &mut registry,
    )?;

    log::info!(
        "Registered {} operations ({} handlers)",
        registry.operations().len(),
        registry.len()
    );
    Ok(Dispatcher::new(registry))
}
