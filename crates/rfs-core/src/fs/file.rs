//! Directory and link mutation: mkdir, rmdir, create, unlink, rename,
//! hardlink, symlink, readlink.
//!
//! Each operation holds the parent directory's mutation lock from before
//! the backing mutation until the metadata commit, so concurrent listings
//! never see a child with only one of its two rows.

use rfs_types::{FileEntry, FileKind};

use crate::config::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DEFAULT_SYMLINK_MODE};
use crate::error::{FsError, FsResult};
use crate::meta::{FileRecord, User};
use crate::paths;
use crate::perms::AccessMode;

use super::Filesystem;

impl Filesystem {
    pub async fn mkdir(&self, user: &User, parent_ino: u64, name: &str) -> FsResult<FileEntry> {
        let (parent, parent_path) = self.dir_of(parent_ino)?;
        self.require(&parent, AccessMode::Write, user)?;
        let child = paths::child_of(&parent_path.path, name)?;

        let _guard = self.lock_dir(parent_ino).await;

        self.backing.mkdir(&child).await?;
        let stat = self.backing.lstat(&child).await?;
        let file = FileRecord {
            ino: stat.ino,
            kind: FileKind::Directory,
            permissions: DEFAULT_DIR_MODE,
            owner_uid: user.uid,
            group_gid: user.gid,
        };
        self.commit("mkdir", &child, self.meta.insert_entry(&file, &child))?;
        self.assemble(&child, &file, &stat)
    }

    pub async fn rmdir(&self, user: &User, parent_ino: u64, name: &str) -> FsResult<()> {
        let (parent, parent_path) = self.dir_of(parent_ino)?;
        self.require(&parent, AccessMode::Write, user)?;
        let child = paths::child_of(&parent_path.path, name)?;

        let _guard = self.lock_dir(parent_ino).await;

        let row = self
            .meta
            .path(&child)?
            .ok_or_else(|| FsError::not_found(format!("no entry at {child}")))?;
        let file = self
            .meta
            .file_by_ino(row.ino)?
            .ok_or_else(|| FsError::mismatch(&child, "path row without a file row"))?;
        if !file.kind.is_dir() {
            return Err(FsError::not_a_directory(format!("{child} is not a directory")));
        }

        self.backing.rmdir(&child).await?;
        self.commit("rmdir", &child, self.meta.remove_dir_entry(&child, row.ino))
    }

    pub async fn create(&self, user: &User, parent_ino: u64, name: &str) -> FsResult<FileEntry> {
        let (parent, parent_path) = self.dir_of(parent_ino)?;
        self.require(&parent, AccessMode::Write, user)?;
        let child = paths::child_of(&parent_path.path, name)?;

        let _guard = self.lock_dir(parent_ino).await;

        self.backing.create_exclusive(&child).await?;
        let stat = self.backing.lstat(&child).await?;
        let file = FileRecord {
            ino: stat.ino,
            kind: FileKind::Regular,
            permissions: DEFAULT_FILE_MODE,
            owner_uid: user.uid,
            group_gid: user.gid,
        };
        self.commit("create", &child, self.meta.insert_entry(&file, &child))?;
        self.assemble(&child, &file, &stat)
    }

    pub async fn unlink(&self, user: &User, parent_ino: u64, name: &str) -> FsResult<()> {
        let (parent, parent_path) = self.dir_of(parent_ino)?;
        self.require(&parent, AccessMode::Write, user)?;
        let child = paths::child_of(&parent_path.path, name)?;

        let _guard = self.lock_dir(parent_ino).await;

        let row = self
            .meta
            .path(&child)?
            .ok_or_else(|| FsError::not_found(format!("no entry at {child}")))?;
        let file = self
            .meta
            .file_by_ino(row.ino)?
            .ok_or_else(|| FsError::mismatch(&child, "path row without a file row"))?;
        if file.kind.is_dir() {
            return Err(FsError::is_a_directory(format!("{child} is a directory")));
        }

        self.backing.unlink(&child).await?;
        self.commit("unlink", &child, self.meta.unlink_path(&child).map(|_| ()))
    }

    /// Move an entry between (or within) directories. The File row is
    /// untouched; only path bindings move — all of them, when the entry is a
    /// directory.
    pub async fn rename(
        &self,
        user: &User,
        old_parent_ino: u64,
        old_name: &str,
        new_parent_ino: u64,
        new_name: &str,
    ) -> FsResult<FileEntry> {
        let (old_parent, old_parent_path) = self.dir_of(old_parent_ino)?;
        let (new_parent, new_parent_path) = self.dir_of(new_parent_ino)?;
        self.require(&old_parent, AccessMode::Write, user)?;
        self.require(&new_parent, AccessMode::Write, user)?;
        let old = paths::child_of(&old_parent_path.path, old_name)?;
        let new = paths::child_of(&new_parent_path.path, new_name)?;

        let _guards = self.lock_dir_pair(old_parent_ino, new_parent_ino).await;

        let row = self
            .meta
            .path(&old)?
            .ok_or_else(|| FsError::not_found(format!("no entry at {old}")))?;
        let file = self
            .meta
            .file_by_ino(row.ino)?
            .ok_or_else(|| FsError::mismatch(&old, "path row without a file row"))?;
        if self.meta.path(&new)?.is_some() {
            return Err(FsError::already_exists(format!("{new} already exists")));
        }

        self.backing.rename(&old, &new).await?;
        self.commit(
            "rename",
            &new,
            self.meta.rename_path(&old, &new, file.kind.is_dir()),
        )?;

        let stat = self.backing.lstat(&new).await?;
        self.assemble(&new, &file, &stat)
    }

    /// Bind an additional name to an existing regular file.
    pub async fn hardlink(
        &self,
        user: &User,
        target_ino: u64,
        link_parent_ino: u64,
        link_name: &str,
    ) -> FsResult<FileEntry> {
        let target = self.file_of(target_ino)?;
        if target.kind.is_dir() {
            return Err(FsError::is_a_directory(format!(
                "cannot hardlink directory inode {target_ino}"
            )));
        }
        let (link_parent, link_parent_path) = self.dir_of(link_parent_ino)?;
        self.require(&link_parent, AccessMode::Write, user)?;
        let link = paths::child_of(&link_parent_path.path, link_name)?;
        let target_path = self.primary_path_of(&target)?;

        let _guard = self.lock_dir(link_parent_ino).await;

        self.backing.hardlink(&target_path.path, &link).await?;
        self.commit("hardlink", &link, self.meta.insert_path(&link, target_ino))?;

        let stat = self.backing.lstat(&link).await?;
        self.assemble(&link, &target, &stat)
    }

    /// Create a symlink. `target` is an opaque string stored by the host;
    /// it is not canonicalized and may dangle.
    pub async fn symlink(
        &self,
        user: &User,
        target: &str,
        link_parent_ino: u64,
        link_name: &str,
    ) -> FsResult<FileEntry> {
        let (link_parent, link_parent_path) = self.dir_of(link_parent_ino)?;
        self.require(&link_parent, AccessMode::Write, user)?;
        let link = paths::child_of(&link_parent_path.path, link_name)?;

        let _guard = self.lock_dir(link_parent_ino).await;

        self.backing.symlink(target, &link).await?;
        // Stat the link itself, never the target.
        let stat = self.backing.lstat(&link).await?;
        let file = FileRecord {
            ino: stat.ino,
            kind: FileKind::Symlink,
            permissions: DEFAULT_SYMLINK_MODE,
            owner_uid: user.uid,
            group_gid: link_parent.group_gid,
        };
        self.commit("symlink", &link, self.meta.insert_entry(&file, &link))?;
        self.assemble(&link, &file, &stat)
    }

    pub async fn readlink(&self, ino: u64) -> FsResult<String> {
        let file = self.file_of(ino)?;
        if !file.kind.is_symlink() {
            return Err(FsError::invalid(format!("inode {ino} is not a symlink")));
        }
        let path = self.primary_path_of(&file)?;
        self.backing.read_link(&path.path).await
    }
}
