//! The entry descriptor — the JSON shape every metadata-bearing response
//! carries.

use serde::{Deserialize, Serialize};

use crate::codec;

/// File type as it appears on the wire: `0` regular, `1` directory,
/// `2` symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

impl FileKind {
    pub fn is_file(&self) -> bool {
        matches!(self, FileKind::Regular)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, FileKind::Symlink)
    }
}

impl From<FileKind> for u8 {
    fn from(kind: FileKind) -> u8 {
        match kind {
            FileKind::Regular => 0,
            FileKind::Directory => 1,
            FileKind::Symlink => 2,
        }
    }
}

impl TryFrom<u8> for FileKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(FileKind::Regular),
            1 => Ok(FileKind::Directory),
            2 => Ok(FileKind::Symlink),
            other => Err(format!("unknown file type: {other}")),
        }
    }
}

/// A full entry descriptor.
///
/// Assembled per response from a fresh `lstat` (size, times, nlinks, ino)
/// joined with the metadata row (type, permissions, owner, group) and the
/// canonical path binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Host inode number, decimal string.
    #[serde(with = "codec::u64_string")]
    pub ino: u64,
    /// Final path component; `"/"` for the root itself.
    pub name: String,
    /// Canonical absolute path.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Low nine POSIX mode bits.
    pub permissions: u32,
    /// Owning user id.
    pub owner: u32,
    /// Owning group id, if any.
    pub group: Option<u32>,
    /// Size in bytes, decimal string.
    #[serde(with = "codec::u64_string")]
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub btime: i64,
    /// Hard link count.
    pub nlinks: u32,
}

// ============================================================================
// Tests
// ============================================================================
