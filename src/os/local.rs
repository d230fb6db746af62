//! Local filesystem backend

use std::fs;
use std::io;
use std::path::Path;

use super::{FilesystemOsApi, OsError, OsResult};

/// Filesystem operations through `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

fn os_error(path: &str, err: io::Error) -> OsError {
    match err.kind() {
        io::ErrorKind::NotFound => OsError::NotFound(format!("{}: {}", path, err)),
        io::ErrorKind::AlreadyExists => OsError::AlreadyExists(format!("{}: {}", path, err)),
        _ => OsError::Io(err),
    }
}

#[cfg(windows)]
fn symlink_dir(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, target)
}

#[cfg(unix)]
fn symlink_dir(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

impl FilesystemOsApi for LocalFilesystem {
    fn path_exists(&self, path: &str) -> OsResult<bool> {
        // A dangling symlink still occupies the path
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(os_error(path, e)),
        }
    }

    fn mkdir(&self, path: &str) -> OsResult<()> {
        fs::create_dir_all(path).map_err(|e| os_error(path, e))
    }

    fn rmdir(&self, path: &str, force: bool) -> OsResult<()> {
        let result = if force {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        };
        result.map_err(|e| os_error(path, e))
    }

    fn create_symlink(&self, source_path: &str, target_path: &str) -> OsResult<()> {
        symlink_dir(Path::new(source_path), Path::new(target_path))
            .map_err(|e| os_error(target_path, e))
    }

    fn is_symlink(&self, path: &str) -> OsResult<bool> {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .map_err(|e| os_error(path, e))
    }
}
