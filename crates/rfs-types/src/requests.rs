//! Request and small response bodies.

use serde::{Deserialize, Serialize};

use crate::codec;

/// Body of `PATCH /api/directories/{oldParentIno}/entries/{oldName}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    #[serde(with = "codec::u64_string")]
    pub new_parent_ino: u64,
    pub new_name: String,
}

/// Body of `PATCH /api/files/{ino}/attributes`. All fields optional;
/// absent fields leave the attribute untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttrRequest {
    pub perm: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    #[serde(default, with = "codec::opt_u64_string")]
    pub size: Option<u64>,
}

impl SetAttrRequest {
    /// True when no attribute is being changed.
    pub fn is_empty(&self) -> bool {
        self.perm.is_none() && self.uid.is_none() && self.gid.is_none() && self.size.is_none()
    }
}

/// Body of `POST /api/links/{targetIno}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardlinkRequest {
    #[serde(with = "codec::u64_string")]
    pub link_parent_ino: u64,
    pub link_name: String,
}

/// Body of `POST /api/symlinks`.
///
/// `target_path` is an opaque string stored verbatim by the host; the server
/// does not canonicalize or validate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymlinkRequest {
    #[serde(with = "codec::u64_string")]
    pub link_parent_ino: u64,
    pub link_name: String,
    pub target_path: String,
}

/// Reply of the write endpoints: number of bytes written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WriteReply {
    pub bytes: u64,
}

/// Reply of `GET /api/symlinks/{ino}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadlinkReply {
    pub target: String,
}

/// Reply of `GET /api/size`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiskUsage {
    #[serde(with = "codec::u64_string")]
    pub total: u64,
    #[serde(with = "codec::u64_string")]
    pub available: u64,
}
