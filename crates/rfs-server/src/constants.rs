//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Default TCP port for the line-framed JSON edge.
pub const DEFAULT_TCP_PORT: u16 = 3000;

/// Default bind address (localhost only; put a real transport in front for
/// anything else).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Largest accepted request frame. Bulk data goes through the stream
/// endpoints in 64 KiB chunks, so control frames never come close.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Suffix of the default metadata database name.
pub const DB_FILENAME_SUFFIX: &str = "-meta.db";

/// Default metadata database path for a backing root: a sibling file named
/// after the root (`/srv/rfs` → `/srv/rfs-meta.db`).
///
/// The database must stay **outside** the backing root — SQLite's files
/// would otherwise appear in every listing of `/` as entries the metadata
/// store has no row for, which readdir reports as EIO.
pub fn default_db_path(data_root: &Path) -> PathBuf {
    let mut name = data_root
        .file_name()
        .unwrap_or_else(|| OsStr::new("rfs"))
        .to_os_string();
    name.push(DB_FILENAME_SUFFIX);
    data_root.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path_is_a_sibling() {
        assert_eq!(
            default_db_path(Path::new("/srv/rfs")),
            Path::new("/srv/rfs-meta.db")
        );
        assert_eq!(default_db_path(Path::new("data")), Path::new("data-meta.db"));
        assert!(!default_db_path(Path::new("/srv/rfs")).starts_with("/srv/rfs/"));
    }
}
