//! Process-wide configuration and fixed limits.
//!
//! Built once at startup and threaded through the store constructors —
//! there are no ambient globals.

use std::path::{Path, PathBuf};

/// Hard cap on a single read, in bytes.
pub const MAX_READ_SIZE: u64 = 1024 * 1024;

/// Hard cap on a single (non-streamed) write body, in bytes. Enforced by the
/// transport before dispatch.
pub const MAX_WRITE_BODY: u64 = 1024 * 1024 * 1024;

/// Chunk size the streaming variants read and write with.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Mode bits for files created through `create`.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Mode bits for directories created through `mkdir`.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Mode bits for `/`: open to everyone, so the tree is usable without the
/// administrator pre-creating per-user directories. Readability of the root
/// is a protocol guarantee.
pub const ROOT_DIR_MODE: u32 = 0o777;

/// Mode bits recorded for new symlinks.
pub const DEFAULT_SYMLINK_MODE: u32 = 0o755;

/// Mode bits for the reserved side-channel files; world-writable so any
/// authenticated user can reach account provisioning.
pub const RESERVED_FILE_MODE: u32 = 0o666;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct FsConfig {
    /// Directory holding the backing entries. Created if missing.
    pub data_root: PathBuf,
    /// SQLite file for the metadata store; `None` keeps metadata in memory
    /// (tests). Must lie outside `data_root` — SQLite's files would
    /// otherwise show up in listings of `/` as entries without metadata
    /// rows, which readdir reports as EIO.
    pub db_path: Option<PathBuf>,
}

impl FsConfig {
    pub fn new(data_root: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            db_path: Some(db_path.into()),
        }
    }

    /// Config with in-memory metadata, for tests and scratch servers.
    pub fn ephemeral(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            db_path: None,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}
