//! Path helpers for SFTP operations
//!
//! Remote paths always use `/` (per SFTP protocol, even on Windows
//! servers); local paths use the platform separator.

use std::path::{Path, PathBuf};

pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote path components using `/`
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.is_empty() {
        component.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Last component of a remote path, ignoring trailing slashes
pub fn remote_basename(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

/// Last component of a local path
pub fn local_basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

/// `<dir>/<basename(remote)>` on the local side
pub fn local_destination(dir: &Path, remote: &str) -> Option<PathBuf> {
    remote_basename(remote).map(|name| dir.join(name))
}
