//! Filesystem API
//!
//! Directory and symlink management on host paths, used to stage volume mount
//! points for workloads. Every path must be absolute and free of `..`.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::sync::Arc;

use crate::api::Registry;
use crate::error::ProxyError;
use crate::os::FilesystemOsApi;

pub const PATH_EXISTS: &str = "PathExists";
pub const MKDIR: &str = "Mkdir";
pub const RMDIR: &str = "Rmdir";
pub const CREATE_SYMLINK: &str = "CreateSymlink";
pub const IS_SYMLINK: &str = "IsSymlink";

/// Versions served by the filesystem API
pub const VERSIONS: [&str; 2] = ["v1beta1", "v1"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathExistsRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MkdirResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmdirRequest {
    pub path: String,
    /// Remove the directory's contents too
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RmdirResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSymlinkRequest {
    /// Existing directory the link points to
    pub source_path: String,
    /// Path of the link to create
    pub target_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSymlinkResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsSymlinkRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsSymlinkResponse {
    pub is_symlink: bool,
}

/// Reject empty, relative and `..`-containing paths
pub fn validate_path(path: &str) -> Result<(), ProxyError> {
    if path.is_empty() {
        return Err(ProxyError::InvalidArgument("path must not be empty".to_string()));
    }
    let parsed = Path::new(path);
    if !parsed.is_absolute() {
        return Err(ProxyError::InvalidArgument(format!(
            "path {} is not absolute",
            path
        )));
    }
    if parsed.components().any(|c| c == Component::ParentDir) {
        return Err(ProxyError::InvalidArgument(format!(
            "path {} contains '..'",
            path
        )));
    }
    Ok(())
}

/// Thin adapter over [`FilesystemOsApi`]
pub struct FilesystemService {
    api: Arc<dyn FilesystemOsApi>,
}

impl FilesystemService {
    pub fn new(api: Arc<dyn FilesystemOsApi>) -> Self {
        Self { api }
    }

    pub fn path_exists(&self, path: &str) -> Result<bool, ProxyError> {
        validate_path(path)?;
        self.api
            .path_exists(path)
            .map_err(ProxyError::FilesystemOperationFailed)
    }

    pub fn mkdir(&self, path: &str) -> Result<(), ProxyError> {
        validate_path(path)?;
        log::debug!("Creating directory {}", path);
        self.api
            .mkdir(path)
            .map_err(ProxyError::FilesystemOperationFailed)
    }

    pub fn rmdir(&self, path: &str, force: bool) -> Result<(), ProxyError> {
        validate_path(path)?;
        log::debug!("Removing directory {} (force: {})", path, force);
        self.api
            .rmdir(path, force)
            .map_err(ProxyError::FilesystemOperationFailed)
    }

    pub fn create_symlink(&self, source_path: &str, target_path: &str) -> Result<(), ProxyError> {
        validate_path(source_path)?;
        validate_path(target_path)?;
        log::info!("Linking {} -> {}", target_path, source_path);
        self.api
            .create_symlink(source_path, target_path)
            .map_err(ProxyError::FilesystemOperationFailed)
    }

    pub fn is_symlink(&self, path: &str) -> Result<bool, ProxyError> {
        validate_path(path)?;
        self.api
            .is_symlink(path)
            .map_err(ProxyError::FilesystemOperationFailed)
    }
}

/// Register every filesystem operation for every supported version
pub fn register(service: Arc<FilesystemService>, registry: &mut Registry) -> Result<(), ProxyError> {
    for version in VERSIONS {
        let s = Arc::clone(&service);
        registry.register(PATH_EXISTS, version, move |req: PathExistsRequest| {
            Ok(PathExistsResponse {
                exists: s.path_exists(&req.path)?,
            })
        })?;

        let s = Arc::clone(&service);
        registry.register(MKDIR, version, move |req: MkdirRequest| {
            s.mkdir(&req.path)?;
            Ok(MkdirResponse {})
        })?;

        let s = Arc::clone(&service);
        registry.register(RMDIR, version, move |req: RmdirRequest| {
            s.rmdir(&req.path, req.force)?;
            Ok(RmdirResponse {})
        })?;

        let s = Arc::clone(&service);
        registry.register(CREATE_SYMLINK, version, move |req: CreateSymlinkRequest| {
            s.create_symlink(&req.source_path, &req.target_path)?;
            Ok(CreateSymlinkResponse {})
        })?;

        let s = Arc::clone(&service);
        registry.register(IS_SYMLINK, version, move |req: IsSymlinkRequest| {
            Ok(IsSymlinkResponse {
                is_symlink: s.is_symlink(&req.path)?,
            })
        })?;
    }
    Ok(())
}
