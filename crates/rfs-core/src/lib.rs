//! # rfs-core
//!
//! Core of the rfs remote filesystem server.
//!
//! Entries live as real files under a fixed backing root; parallel metadata
//! (ownership, group, permission bits, inode-to-path bindings) lives in a
//! SQLite store. [`Filesystem`] joins the two behind inode-addressed
//! operations with a uniform POSIX rwx permission check and surfaces any
//! divergence between the stores as EIO rather than repairing it.
//!
//! Layering, leaves first:
//!
//! - [`paths`] — canonical path hygiene, in one place
//! - [`meta`] — Users / Groups / Files / Paths with transactional grouping
//! - [`backing`] — the host filesystem below the configured root
//! - [`perms`] — the pure rwx check with the admin override
//! - [`fs`] — the operations the transport dispatches to
//! - [`accounts`] — the reserved-file provisioning side channel

pub mod accounts;
pub mod backing;
pub mod config;
pub mod error;
pub mod fs;
pub mod meta;
pub mod paths;
pub mod perms;

pub use accounts::Accounts;
pub use backing::{BackingStat, BackingStore};
pub use config::FsConfig;
pub use error::{FsError, FsResult};
pub use fs::{Filesystem, GetAttrOutcome};
pub use meta::{FileRecord, Group, MetaStore, PathRecord, User};
pub use perms::{allowed, AccessMode, ADMIN_UID};
