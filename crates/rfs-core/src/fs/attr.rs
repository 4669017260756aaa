//! Attribute operations: lookup, readdir, getattr, setattr.

use rfs_types::{FileEntry, SetAttrRequest};

use crate::error::{FsError, FsResult};
use crate::meta::User;
use crate::paths;
use crate::perms::{allowed, AccessMode};

use super::Filesystem;

/// Result of a conditional getattr.
#[derive(Debug, Clone)]
pub enum GetAttrOutcome {
    Entry(FileEntry),
    /// The client's last-known mtime is current; no body.
    NotModified,
}

impl Filesystem {
    /// Resolve one name inside a directory.
    pub async fn lookup(&self, user: &User, parent_ino: u64, name: &str) -> FsResult<FileEntry> {
        let (parent, parent_path) = self.dir_of(parent_ino)?;
        self.require(&parent, AccessMode::Read, user)?;
        let child = paths::child_of(&parent_path.path, name)?;

        let _guard = self.lock_dir(parent_ino).await;

        let stat = self.backing.lstat(&child).await?;
        let file = self
            .meta
            .file_by_ino(stat.ino)?
            .ok_or_else(|| FsError::mismatch(&child, "backing entry without a file row"))?;
        let row = self
            .meta
            .path(&child)?
            .ok_or_else(|| FsError::mismatch(&child, "backing entry without a path row"))?;
        if row.ino != stat.ino {
            return Err(FsError::mismatch(&child, "path row bound to a different inode"));
        }

        self.assemble(&child, &file, &stat)
    }

    /// List a directory. Children the caller cannot read are silently
    /// omitted; children present in only one of the two stores are an EIO.
    pub async fn readdir(&self, user: &User, ino: u64) -> FsResult<Vec<FileEntry>> {
        let (dir, dir_path) = self.dir_of(ino)?;
        self.require(&dir, AccessMode::Read, user)?;

        let _guard = self.lock_dir(ino).await;

        let names = self.backing.read_dir(&dir_path.path).await?;
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let child = paths::child_of(&dir_path.path, &name)?;
            let stat = self.backing.lstat(&child).await?;
            let file = self
                .meta
                .file_by_ino(stat.ino)?
                .ok_or_else(|| FsError::mismatch(&child, "backing entry without a file row"))?;
            let row = self
                .meta
                .path(&child)?
                .ok_or_else(|| FsError::mismatch(&child, "backing entry without a path row"))?;
            if row.ino != stat.ino {
                return Err(FsError::mismatch(&child, "path row bound to a different inode"));
            }
            if !allowed(&file, AccessMode::Read, user) {
                continue;
            }
            entries.push(self.assemble(&child, &file, &stat)?);
        }
        Ok(entries)
    }

    /// Fresh attributes, or `NotModified` when the client's last-known mtime
    /// (seconds resolution) is at least as new as the file's.
    pub async fn getattr(
        &self,
        user: &User,
        ino: u64,
        if_modified_since_ms: Option<i64>,
    ) -> FsResult<GetAttrOutcome> {
        let file = self.file_of(ino)?;
        self.require(&file, AccessMode::Read, user)?;
        let path = self.primary_path_of(&file)?;
        let stat = self.backing.lstat(&path.path).await?;

        if let Some(since_ms) = if_modified_since_ms {
            if since_ms / 1000 >= stat.mtime_ms / 1000 {
                return Ok(GetAttrOutcome::NotModified);
            }
        }

        Ok(GetAttrOutcome::Entry(self.assemble(&path.path, &file, &stat)?))
    }

    /// Change permissions, ownership, or size.
    ///
    /// Ownership policy: a known `uid` transfers the file to that user and
    /// that user's primary group; an unknown `uid` reassigns to the caller
    /// and the caller's group; a `gid` without a `uid` is refused.
    pub async fn setattr(
        &self,
        user: &User,
        ino: u64,
        change: &SetAttrRequest,
    ) -> FsResult<FileEntry> {
        let mut file = self.file_of(ino)?;
        self.require(&file, AccessMode::Write, user)?;
        let path = self.primary_path_of(&file)?;

        // Validate everything before mutating anything.
        if let Some(perm) = change.perm {
            if perm > 0o777 {
                return Err(FsError::invalid(format!("mode out of range: {perm:#o}")));
            }
        }
        if change.gid.is_some() && change.uid.is_none() {
            return Err(FsError::access_denied(
                "group change without an ownership change is refused",
            ));
        }
        if change.size.is_some() && file.kind.is_dir() {
            return Err(FsError::is_a_directory(format!(
                "cannot truncate directory {}",
                path.path
            )));
        }

        if let Some(perm) = change.perm {
            self.meta.update_permissions(ino, perm)?;
            file.permissions = perm;
        }

        if let Some(uid) = change.uid {
            let (owner, group) = match self.meta.user(uid)? {
                Some(target) => (target.uid, target.gid),
                // Unknown uid: ownership falls to the caller.
                None => (user.uid, user.gid),
            };
            self.meta.update_owner_group(ino, owner, group)?;
            file.owner_uid = owner;
            file.group_gid = group;
        }

        if let Some(size) = change.size {
            self.backing.truncate(&path.path, size).await?;
        }

        self.entry_at(&path.path, &file).await
    }
}
