//! Shared wire types for the rfs remote filesystem protocol.
//!
//! Everything a client sees on the wire is defined here: the entry
//! descriptor returned by lookup/readdir/getattr/setattr and the directory
//! mutations, the request bodies for rename/setattr/link/symlink, and the
//! small response shapes (write counts, readlink targets, disk usage).
//!
//! This crate has **no internal rfs dependencies** — a pure leaf crate that
//! both the server core and native clients build on.
//!
//! # Wire conventions
//!
//! - Inode numbers and byte sizes are 64-bit unsigned and travel as decimal
//!   **strings** (JavaScript clients lose precision above 2^53).
//! - Timestamps are integer milliseconds since the Unix epoch.
//! - File types are the integers `0` (regular), `1` (directory),
//!   `2` (symlink).
//! - Body field names are camelCase.

pub mod codec;
pub mod entry;
pub mod requests;

pub use entry::{FileEntry, FileKind};
pub use requests::{
    DiskUsage, HardlinkRequest, ReadlinkReply, RenameRequest, SetAttrRequest, SymlinkRequest,
    WriteReply,
};
