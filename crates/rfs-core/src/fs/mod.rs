//! The filesystem operations layer.
//!
//! [`Filesystem`] ties the metadata store, the backing store, and the
//! permission check together and exposes the inode-addressed operations the
//! transport dispatches to. Every mutation follows the same protocol:
//! metadata preconditions, backing mutation, metadata commit, response
//! assembly from a fresh lstat. A commit failure after the backing mutation
//! succeeded is logged and surfaced as EIO — divergence is never silently
//! repaired.

mod attr;
mod file;
mod io;

pub use attr::GetAttrOutcome;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use rfs_types::{FileEntry, FileKind};

use crate::accounts::{Accounts, CREATE_GROUP_PATH, CREATE_USER_PATH};
use crate::backing::{BackingStat, BackingStore};
use crate::config::{FsConfig, DEFAULT_DIR_MODE, RESERVED_FILE_MODE, ROOT_DIR_MODE};
use crate::error::{FsError, FsResult};
use crate::meta::{FileRecord, MetaStore, PathRecord, User};
use crate::paths;
use crate::perms::{allowed, AccessMode, ADMIN_UID};

/// The administrator's home directory, provisioned on first start.
const ADMIN_HOME: &str = "/admin";

/// The core filesystem service.
pub struct Filesystem {
    meta: Arc<MetaStore>,
    backing: BackingStore,
    accounts: Arc<dyn Accounts>,
    /// Per-directory-inode mutation locks; entries are created on first use
    /// and kept for the life of the process.
    dir_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl Filesystem {
    /// Open the backing root (creating it if needed) and run first-start
    /// provisioning: the root binding, the administrator row, the admin
    /// home, and the reserved account files. Idempotent.
    pub async fn new(
        config: &FsConfig,
        meta: Arc<MetaStore>,
        accounts: Arc<dyn Accounts>,
    ) -> FsResult<Self> {
        let backing = BackingStore::open(&config.data_root).await?;
        let fs = Self {
            meta,
            backing,
            accounts,
            dir_locks: DashMap::new(),
        };
        fs.initialize().await?;
        Ok(fs)
    }

    pub fn meta(&self) -> &MetaStore {
        &self.meta
    }

    pub fn backing(&self) -> &BackingStore {
        &self.backing
    }

    /// Inode of the root directory.
    pub async fn root_ino(&self) -> FsResult<u64> {
        Ok(self.backing.lstat("/").await?.ino)
    }

    async fn initialize(&self) -> FsResult<()> {
        self.meta.upsert_user(ADMIN_UID)?;

        if self.meta.path("/")?.is_none() {
            let stat = self.backing.lstat("/").await?;
            self.meta.insert_entry(
                &FileRecord {
                    ino: stat.ino,
                    kind: FileKind::Directory,
                    permissions: ROOT_DIR_MODE,
                    owner_uid: ADMIN_UID,
                    group_gid: None,
                },
                "/",
            )?;
        }

        self.ensure_admin_dir(ADMIN_HOME).await?;
        self.ensure_reserved_file(CREATE_USER_PATH).await?;
        self.ensure_reserved_file(CREATE_GROUP_PATH).await?;
        Ok(())
    }

    async fn ensure_admin_dir(&self, path: &str) -> FsResult<()> {
        if self.meta.path(path)?.is_some() {
            return Ok(());
        }
        match self.backing.mkdir(path).await {
            Ok(()) | Err(FsError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        let stat = self.backing.lstat(path).await?;
        self.meta.insert_entry(
            &FileRecord {
                ino: stat.ino,
                kind: FileKind::Directory,
                permissions: DEFAULT_DIR_MODE,
                owner_uid: ADMIN_UID,
                group_gid: None,
            },
            path,
        )
    }

    async fn ensure_reserved_file(&self, path: &str) -> FsResult<()> {
        if self.meta.path(path)?.is_some() {
            return Ok(());
        }
        match self.backing.create_exclusive(path).await {
            Ok(()) | Err(FsError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        let stat = self.backing.lstat(path).await?;
        self.meta.insert_entry(
            &FileRecord {
                ino: stat.ino,
                kind: FileKind::Regular,
                permissions: RESERVED_FILE_MODE,
                owner_uid: ADMIN_UID,
                group_gid: None,
            },
            path,
        )
    }

    // ========================================================================
    // Shared resolution and assembly
    // ========================================================================

    /// Resolve an inode to its File row.
    pub(crate) fn file_of(&self, ino: u64) -> FsResult<FileRecord> {
        self.meta
            .file_by_ino(ino)?
            .ok_or_else(|| FsError::not_found(format!("no inode {ino}")))
    }

    /// Resolve an inode that must be a directory, together with its single
    /// path binding.
    pub(crate) fn dir_of(&self, ino: u64) -> FsResult<(FileRecord, PathRecord)> {
        let file = self.file_of(ino)?;
        if !file.kind.is_dir() {
            return Err(FsError::not_a_directory(format!(
                "inode {ino} is not a directory"
            )));
        }
        let path = self.primary_path_of(&file)?;
        Ok((file, path))
    }

    pub(crate) fn primary_path_of(&self, file: &FileRecord) -> FsResult<PathRecord> {
        self.meta.primary_path(file.ino)?.ok_or_else(|| {
            FsError::io(format!("inode {} has a file row but no path row", file.ino))
        })
    }

    pub(crate) fn require(
        &self,
        file: &FileRecord,
        mode: AccessMode,
        user: &User,
    ) -> FsResult<()> {
        if allowed(file, mode, user) {
            Ok(())
        } else {
            Err(FsError::access_denied(format!(
                "uid {} lacks {mode:?} on inode {}",
                user.uid, file.ino
            )))
        }
    }

    /// Build the entry descriptor for a path from its metadata row and a
    /// live stat, verifying the two still agree on the inode.
    pub(crate) fn assemble(
        &self,
        path: &str,
        file: &FileRecord,
        stat: &BackingStat,
    ) -> FsResult<FileEntry> {
        if stat.ino != file.ino {
            return Err(FsError::mismatch(path, "inode changed under the metadata"));
        }
        Ok(FileEntry {
            ino: file.ino,
            name: paths::basename(path).to_string(),
            path: path.to_string(),
            kind: file.kind,
            permissions: file.permissions,
            owner: file.owner_uid,
            group: file.group_gid,
            size: stat.size,
            atime: stat.atime_ms,
            mtime: stat.mtime_ms,
            ctime: stat.ctime_ms,
            btime: stat.btime_ms,
            nlinks: stat.nlinks,
        })
    }

    /// Entry descriptor from a fresh lstat.
    pub(crate) async fn entry_at(&self, path: &str, file: &FileRecord) -> FsResult<FileEntry> {
        let stat = self.backing.lstat(path).await?;
        self.assemble(path, file, &stat)
    }

    // ========================================================================
    // Directory serialization
    // ========================================================================

    fn lock_handle(&self, ino: u64) -> Arc<Mutex<()>> {
        self.dir_locks
            .entry(ino)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Serialize mutations (and listing) of one directory.
    pub(crate) async fn lock_dir(&self, ino: u64) -> OwnedMutexGuard<()> {
        self.lock_handle(ino).lock_owned().await
    }

    /// Lock two directories in ascending inode order (one lock when they
    /// coincide), so cross-directory renames cannot deadlock.
    pub(crate) async fn lock_dir_pair(
        &self,
        a: u64,
        b: u64,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        if a == b {
            (self.lock_dir(a).await, None)
        } else {
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            let first = self.lock_dir(lo).await;
            let second = self.lock_dir(hi).await;
            (first, Some(second))
        }
    }

    /// Wrap a metadata commit that runs after a successful backing mutation.
    pub(crate) fn commit<T>(&self, op: &str, path: &str, result: FsResult<T>) -> FsResult<T> {
        result.map_err(|e| {
            tracing::error!(op, path, error = %e, "metadata commit failed after backing mutation");
            FsError::mismatch(path, "metadata commit failed after backing mutation")
        })
    }
}
