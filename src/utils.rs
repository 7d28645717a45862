//! Utility functions for directory management and file persistence
//!
//! This module provides helper functions following the XDG Base Directory specification
//! for the operator-side files portgate owns itself.
//!
//! # Directory Structure
//!
//! - Config: `~/.config/portgate/` - `config.json`
//! - State: `~/.local/state/portgate/` - audit log
//!
//! The filtering program's own files (state record, live config, log) live
//! under the configured `root_dir` instead.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "portgate", "portgate").map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "portgate", "portgate")
        .and_then(|pd| pd.state_dir().map(Path::to_path_buf))
}

pub fn ensure_state_dir() -> std::io::Result<()> {
    let Some(dir) = get_state_dir() else {
        return Ok(());
    };

    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new()
            .mode(0o700) // User read/write/execute only
            .recursive(true)
            .create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Replaces `path` with `contents` so readers never observe a partial write.
///
/// 1. Writes to a temporary file in the same directory.
/// 2. Sets restrictive permissions (0o600).
/// 3. Flushes to disk and atomically renames over the target.
pub async fn write_atomic(path: &Path, contents: Vec<u8>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        temp.write_all(&contents)?;
        temp.as_file().sync_all()?;

        temp.persist(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::StorageFull {
                std::io::Error::new(
                    std::io::ErrorKind::StorageFull,
                    format!("Disk full: cannot write {}", path.display()),
                )
            } else {
                e.error
            }
        })?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}
