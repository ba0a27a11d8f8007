// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::{Path, PathBuf};

/// Name of the platform manifest at the top-level of the harness root.
pub const MANIFEST_FILE: &str = "hotdev.toml";

/// Determine default harness root.
///
/// The harness root is the directory holding the compose file and the
/// `certs/` directory. Sibling repositories live next to it. Defaults to the
/// current working directory.
///
/// # Errors
///
/// - Return [`PathError::NoWorkingDir`] if current directory cannot be read.
pub fn default_root() -> Result<PathBuf> {
    std::env::current_dir().map_err(PathError::NoWorkingDir)
}

/// Determine absolute path to user level platform manifest.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/hotdev/hotdev.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if config directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn user_manifest_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("hotdev").join(MANIFEST_FILE))
        .ok_or(PathError::NoWayHome)
}

/// Location of the OS hosts file.
pub fn default_hosts_file() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// Resolve directory of a sibling repository.
///
/// Relative directories are taken from the parent of the harness root. A root
/// ending in `.` or `..` has no name to strip, so `..` is appended instead.
pub fn sibling_dir(root: &Path, dir: &Path) -> PathBuf {
    match (root.file_name(), root.parent()) {
        (Some(_), Some(parent)) => parent.join(dir),
        _ => root.join("..").join(dir),
    }
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's configuration directory.
    #[error("cannot determine absolute path to user's config directory")]
    NoWayHome,

    /// Current working directory cannot be read.
    #[error("cannot determine current working directory")]
    NoWorkingDir(#[source] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sibling_dir_uses_parent_of_root() {
        let result = sibling_dir(Path::new("/work/hot-dev-env"), Path::new("portal"));
        assert_eq!(result, PathBuf::from("/work/portal"));

        let result = sibling_dir(Path::new("/work/hot-dev-env"), Path::new("/opt/login"));
        assert_eq!(result, PathBuf::from("/opt/login"));
    }

    #[test]
    fn sibling_dir_of_relative_root_leaves_harness() {
        let result = sibling_dir(Path::new("."), Path::new("portal"));
        assert_eq!(result, PathBuf::from("./../portal"));

        let result = sibling_dir(Path::new("hot-dev-env"), Path::new("portal"));
        assert_eq!(result, PathBuf::from("portal"));

        let result = sibling_dir(Path::new("../hot-dev-env/.."), Path::new("portal"));
        assert_eq!(result, PathBuf::from("../hot-dev-env/../../portal"));
    }
}
