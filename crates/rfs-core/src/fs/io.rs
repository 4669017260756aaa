//! Byte-range I/O and the streaming variants.
//!
//! Streaming is the same `(offset, length)` primitive in a loop; permission
//! and resolution checks run once, before the first chunk moves. Backpressure
//! lives in the channel between here and the transport.

use std::io::SeekFrom;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;

use rfs_types::DiskUsage;

use crate::accounts::{is_reserved, parse_directive, CREATE_USER_PATH};
use crate::config::{MAX_READ_SIZE, STREAM_CHUNK_SIZE};
use crate::error::{FsError, FsResult};
use crate::meta::User;
use crate::perms::AccessMode;

use super::Filesystem;

/// Reserved-file directives are single short lines.
const DIRECTIVE_READ_CAP: u64 = 4096;

impl Filesystem {
    /// Read up to `size` bytes at `offset`; `size` is capped at
    /// [`MAX_READ_SIZE`]. Offsets at or past EOF read zero bytes.
    pub async fn read(&self, user: &User, ino: u64, offset: u64, size: u64) -> FsResult<Vec<u8>> {
        let file = self.file_of(ino)?;
        self.require(&file, AccessMode::Read, user)?;
        let path = self.primary_path_of(&file)?;
        self.backing
            .read_at(&path.path, offset, size.min(MAX_READ_SIZE))
            .await
    }

    /// Write `data` at `offset`; returns the byte count. Writes to the
    /// reserved account files trigger the provisioning side effect after the
    /// write completes.
    pub async fn write(&self, user: &User, ino: u64, offset: u64, data: &[u8]) -> FsResult<u64> {
        let file = self.file_of(ino)?;
        self.require(&file, AccessMode::Write, user)?;
        let path = self.primary_path_of(&file)?;

        let written = self.backing.write_at(&path.path, offset, data).await?;
        if is_reserved(&path.path) {
            self.run_reserved_directive(&path.path).await;
        }
        Ok(written)
    }

    /// Stream a whole file out in [`STREAM_CHUNK_SIZE`] chunks.
    pub async fn read_stream(
        &self,
        user: &User,
        ino: u64,
    ) -> FsResult<mpsc::Receiver<FsResult<Bytes>>> {
        let file = self.file_of(ino)?;
        self.require(&file, AccessMode::Read, user)?;
        let path = self.primary_path_of(&file)?;
        let mut handle = self.backing.open_read(&path.path).await?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                match handle.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                            // Receiver hung up; the transport already
                            // terminated the connection.
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Drain `chunks` into the file starting at `offset`; returns the total
    /// byte count.
    pub async fn write_stream(
        &self,
        user: &User,
        ino: u64,
        offset: u64,
        mut chunks: mpsc::Receiver<Bytes>,
    ) -> FsResult<u64> {
        let file = self.file_of(ino)?;
        self.require(&file, AccessMode::Write, user)?;
        let path = self.primary_path_of(&file)?;

        let mut handle = self.backing.open_write(&path.path).await?;
        handle.seek(SeekFrom::Start(offset)).await?;

        let mut written = 0u64;
        while let Some(chunk) = chunks.recv().await {
            handle.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        handle.flush().await?;
        drop(handle);

        if is_reserved(&path.path) {
            self.run_reserved_directive(&path.path).await;
        }
        Ok(written)
    }

    /// Total and available bytes of the volume backing the tree.
    pub fn disk_usage(&self) -> FsResult<DiskUsage> {
        let (total, available) = self.backing.disk_usage()?;
        Ok(DiskUsage { total, available })
    }

    // ========================================================================
    // Reserved-file side channel
    // ========================================================================

    /// Hand a completed reserved-file write to the accounts collaborator and
    /// replace the file content with the outcome. Never fails the write that
    /// triggered it.
    async fn run_reserved_directive(&self, path: &str) {
        let message = match self.reserved_directive(path).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(path, error = %e, "reserved-file directive failed");
                format!("error: {e}\n")
            }
        };
        let rewrite = async {
            self.backing.truncate(path, 0).await?;
            self.backing.write_at(path, 0, message.as_bytes()).await
        };
        if let Err(e) = rewrite.await {
            tracing::error!(path, error = %e, "failed to record directive outcome");
        }
    }

    async fn reserved_directive(&self, path: &str) -> FsResult<String> {
        let raw = self.backing.read_at(path, 0, DIRECTIVE_READ_CAP).await?;
        let content = String::from_utf8_lossy(&raw);
        let (uid, arg) = parse_directive(&content)
            .ok_or_else(|| FsError::invalid("expected two whitespace-separated fields"))?;

        if path == CREATE_USER_PATH {
            self.accounts.create_user(uid, arg).await?;
            Ok(format!("created user {uid}\n"))
        } else {
            let gid: u32 = arg
                .parse()
                .map_err(|_| FsError::invalid(format!("bad gid: {arg:?}")))?;
            self.accounts.assign_group(uid, gid).await?;
            Ok(format!("assigned user {uid} to group {gid}\n"))
        }
    }
}
