//! Backing store: a thin wrapper over the host filesystem rooted at the
//! configured data directory.
//!
//! Canonical paths map onto host paths by appending to the root; clients
//! never reach this layer with a non-canonical path (see `paths`), so no
//! further traversal checks are needed here. All host error codes map into
//! the operation taxonomy through `FsError::from`.

use std::io::SeekFrom;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use rfs_types::FileKind;

use crate::error::{FsError, FsResult};

/// Live stat of a backing entry. Everything the entry descriptor needs that
/// the metadata store deliberately does not persist.
#[derive(Debug, Clone, Copy)]
pub struct BackingStat {
    pub ino: u64,
    pub kind: FileKind,
    pub size: u64,
    pub nlinks: u32,
    /// Milliseconds since the Unix epoch.
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub btime_ms: i64,
}

impl BackingStat {
    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else if meta.file_type().is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::Regular
        };

        // Birth time is not available on every filesystem; fall back to the
        // inode change time.
        let ctime_ms = meta.ctime() * 1000 + meta.ctime_nsec() / 1_000_000;
        let btime_ms = meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(ctime_ms);

        Self {
            ino: meta.ino(),
            kind,
            size: meta.len(),
            nlinks: meta.nlink() as u32,
            atime_ms: meta.atime() * 1000 + meta.atime_nsec() / 1_000_000,
            mtime_ms: meta.mtime() * 1000 + meta.mtime_nsec() / 1_000_000,
            ctime_ms,
            btime_ms,
        }
    }
}

/// Host filesystem access below a fixed root.
#[derive(Debug, Clone)]
pub struct BackingStore {
    root: PathBuf,
}

impl BackingStore {
    /// Root the store at the given directory, creating it if missing.
    pub async fn open(root: impl Into<PathBuf>) -> FsResult<Self> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root).await?;
        let root = root.canonicalize().unwrap_or(root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a canonical path.
    pub fn host_path(&self, canonical: &str) -> PathBuf {
        self.root.join(canonical.trim_start_matches('/'))
    }

    // ========================================================================
    // Stat and directory reads
    // ========================================================================

    /// `lstat` — never follows a trailing symlink.
    pub async fn lstat(&self, canonical: &str) -> FsResult<BackingStat> {
        let meta = fs::symlink_metadata(self.host_path(canonical)).await?;
        Ok(BackingStat::from_metadata(&meta))
    }

    /// Names in a backing directory, sorted.
    pub async fn read_dir(&self, canonical: &str) -> FsResult<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(self.host_path(canonical)).await?;
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    // ========================================================================
    // Directory and link mutation
    // ========================================================================

    pub async fn mkdir(&self, canonical: &str) -> FsResult<()> {
        fs::create_dir(self.host_path(canonical)).await?;
        Ok(())
    }

    /// Remove an empty directory; ENOTEMPTY otherwise.
    pub async fn rmdir(&self, canonical: &str) -> FsResult<()> {
        fs::remove_dir(self.host_path(canonical)).await?;
        Ok(())
    }

    /// Create a new empty regular file; EEXIST on collision.
    pub async fn create_exclusive(&self, canonical: &str) -> FsResult<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.host_path(canonical))
            .await?;
        Ok(())
    }

    pub async fn unlink(&self, canonical: &str) -> FsResult<()> {
        fs::remove_file(self.host_path(canonical)).await?;
        Ok(())
    }

    pub async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        fs::rename(self.host_path(old), self.host_path(new)).await?;
        Ok(())
    }

    /// Create a symlink at `linkpath` whose target is stored verbatim.
    pub async fn symlink(&self, target: &str, linkpath: &str) -> FsResult<()> {
        fs::symlink(target, self.host_path(linkpath)).await?;
        Ok(())
    }

    pub async fn hardlink(&self, target: &str, linkpath: &str) -> FsResult<()> {
        fs::hard_link(self.host_path(target), self.host_path(linkpath)).await?;
        Ok(())
    }

    pub async fn read_link(&self, canonical: &str) -> FsResult<String> {
        let target = fs::read_link(self.host_path(canonical)).await?;
        Ok(target.to_string_lossy().into_owned())
    }

    // ========================================================================
    // Byte-range I/O
    // ========================================================================

    /// Read up to `len` bytes at `offset`. Offsets at or past EOF read zero
    /// bytes.
    pub async fn read_at(&self, canonical: &str, offset: u64, len: u64) -> FsResult<Vec<u8>> {
        let mut file = fs::File::open(self.host_path(canonical)).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Write `data` at `offset` without truncating; writing past EOF extends
    /// the file and the host zero-fills the gap. Returns the byte count.
    pub async fn write_at(&self, canonical: &str, offset: u64, data: &[u8]) -> FsResult<u64> {
        let mut file = self.open_write(canonical).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(data.len() as u64)
    }

    /// Open for reading; the streaming read loop drives this handle.
    pub async fn open_read(&self, canonical: &str) -> FsResult<fs::File> {
        Ok(fs::File::open(self.host_path(canonical)).await?)
    }

    /// Open read/write without truncation; the streaming write loop drives
    /// this handle.
    pub async fn open_write(&self, canonical: &str) -> FsResult<fs::File> {
        Ok(OpenOptions::new()
            .write(true)
            .open(self.host_path(canonical))
            .await?)
    }

    pub async fn truncate(&self, canonical: &str, size: u64) -> FsResult<()> {
        let file = self.open_write(canonical).await?;
        file.set_len(size).await?;
        Ok(())
    }

    /// Total and available bytes of the filesystem holding the root.
    pub fn disk_usage(&self) -> FsResult<(u64, u64)> {
        let stat = rustix::fs::statvfs(&self.root)
            .map_err(|e| FsError::io(format!("statvfs: {e}")))?;
        let total = stat.f_blocks * stat.f_frsize;
        let available = stat.f_bavail * stat.f_frsize;
        Ok((total, available))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (BackingStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BackingStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_write_and_read_at_offset() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/a.txt").await.unwrap();

        assert_eq!(store.write_at("/a.txt", 0, b"ciao mondo").await.unwrap(), 10);
        assert_eq!(store.read_at("/a.txt", 0, 4096).await.unwrap(), b"ciao mondo");
        assert_eq!(store.read_at("/a.txt", 5, 5).await.unwrap(), b"mondo");
    }

    #[tokio::test]
    async fn test_read_past_eof_is_empty() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/a.txt").await.unwrap();
        store.write_at("/a.txt", 0, b"short").await.unwrap();

        assert!(store.read_at("/a.txt", 100, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_past_eof_zero_fills() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/a.txt").await.unwrap();
        store.write_at("/a.txt", 4, b"xy").await.unwrap();

        assert_eq!(store.read_at("/a.txt", 0, 16).await.unwrap(), b"\0\0\0\0xy");
    }

    #[tokio::test]
    async fn test_create_exclusive_collides() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/a.txt").await.unwrap();
        let err = store.create_exclusive("/a.txt").await.unwrap_err();
        assert_eq!(err.identifier(), "EEXIST");
    }

    #[tokio::test]
    async fn test_rmdir_not_empty() {
        let (store, _dir) = setup().await;
        store.mkdir("/d").await.unwrap();
        store.create_exclusive("/d/a.txt").await.unwrap();

        let err = store.rmdir("/d").await.unwrap_err();
        assert_eq!(err.identifier(), "ENOTEMPTY");

        store.unlink("/d/a.txt").await.unwrap();
        store.rmdir("/d").await.unwrap();
    }

    #[tokio::test]
    async fn test_lstat_does_not_follow_symlinks() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/target.txt").await.unwrap();
        store.symlink("/target.txt", "/link").await.unwrap();

        let stat = store.lstat("/link").await.unwrap();
        assert_eq!(stat.kind, FileKind::Symlink);
        assert_eq!(store.read_link("/link").await.unwrap(), "/target.txt");
    }

    #[tokio::test]
    async fn test_hardlink_shares_inode() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/a.txt").await.unwrap();
        store.hardlink("/a.txt", "/b.txt").await.unwrap();

        let a = store.lstat("/a.txt").await.unwrap();
        let b = store.lstat("/b.txt").await.unwrap();
        assert_eq!(a.ino, b.ino);
        assert!(a.nlinks >= 2);
    }

    #[tokio::test]
    async fn test_read_dir_sorted() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/b.txt").await.unwrap();
        store.create_exclusive("/a.txt").await.unwrap();
        store.mkdir("/c").await.unwrap();

        assert_eq!(store.read_dir("/").await.unwrap(), vec!["a.txt", "b.txt", "c"]);
    }

    #[tokio::test]
    async fn test_truncate() {
        let (store, _dir) = setup().await;
        store.create_exclusive("/a.txt").await.unwrap();
        store.write_at("/a.txt", 0, b"hello world").await.unwrap();
        store.truncate("/a.txt", 5).await.unwrap();

        assert_eq!(store.read_at("/a.txt", 0, 100).await.unwrap(), b"hello");
        assert_eq!(store.lstat("/a.txt").await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn test_disk_usage_nonzero() {
        let (store, _dir) = setup().await;
        let (total, available) = store.disk_usage().unwrap();
        assert!(total > 0);
        assert!(available <= total);
    }
}
