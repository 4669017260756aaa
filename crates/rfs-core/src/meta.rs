//! SQLite metadata store: Users, Groups, Files (inodes), Paths (bindings).
//!
//! The store owns File and Path rows exclusively; Users and Groups are
//! written by the accounts collaborator and read here. Grouped mutations
//! (entry creation, last-link removal, rename) run inside one transaction so
//! readers never observe a Path without its File or vice versa.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use rfs_types::FileKind;

use crate::error::{FsError, FsResult};

/// A user as the core sees it: an id and an optional primary group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: u32,
    pub gid: Option<u32>,
}

/// A group. Membership is the `users.gid` column, many users to one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub gid: u32,
}

/// An inode record. Size and times are never stored — they are read live
/// from the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub ino: u64,
    pub kind: FileKind,
    /// Low nine POSIX mode bits, always in `[0, 0o777]`.
    pub permissions: u32,
    pub owner_uid: u32,
    pub group_gid: Option<u32>,
}

/// A canonical-path binding to an inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub path: String,
    pub ino: u64,
}

/// Stored password material for a user, written by the accounts
/// collaborator and checked at the transport edge.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub password_hash: String,
    pub salt: String,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS groups (
    gid INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS users (
    uid           INTEGER PRIMARY KEY,
    password_hash TEXT,
    salt          TEXT,
    gid           INTEGER REFERENCES groups(gid)
);

CREATE TABLE IF NOT EXISTS files (
    ino         TEXT PRIMARY KEY,
    kind        INTEGER NOT NULL,
    permissions INTEGER NOT NULL,
    owner_uid   INTEGER NOT NULL REFERENCES users(uid),
    group_gid   INTEGER REFERENCES groups(gid)
);

CREATE TABLE IF NOT EXISTS paths (
    path TEXT PRIMARY KEY,
    ino  TEXT NOT NULL REFERENCES files(ino)
);
CREATE INDEX IF NOT EXISTS idx_paths_ino ON paths(ino);
"#;

/// Handle on the metadata database. Cheap to share behind an `Arc`; the
/// connection itself is serialized by a mutex, which also gives concurrent
/// operations the §5 total order on metadata commits.
pub struct MetaStore {
    conn: Mutex<Connection>,
}

// Inodes are 64-bit unsigned; SQLite integers are signed. Stored as decimal
// text, which is also the wire form.
fn ino_to_db(ino: u64) -> String {
    ino.to_string()
}

fn ino_from_db(s: &str) -> FsResult<u64> {
    s.parse()
        .map_err(|_| FsError::io(format!("corrupt inode key in metadata store: {s:?}")))
}

impl MetaStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests and ephemeral servers.
    pub fn in_memory() -> FsResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ========================================================================
    // Users and groups (read side; writes come from the accounts collaborator)
    // ========================================================================

    pub fn user(&self, uid: u32) -> FsResult<Option<User>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT uid, gid FROM users WHERE uid = ?1",
                params![uid],
                |row| {
                    Ok(User {
                        uid: row.get(0)?,
                        gid: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// A user's primary group, if they have one.
    pub fn group_of_user(&self, uid: u32) -> FsResult<Option<Group>> {
        match self.user(uid)? {
            Some(User { gid: Some(gid), .. }) => self.group(gid),
            _ => Ok(None),
        }
    }

    pub fn group(&self, gid: u32) -> FsResult<Option<Group>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row("SELECT gid FROM groups WHERE gid = ?1", params![gid], |row| {
                Ok(Group { gid: row.get(0)? })
            })
            .optional()?;
        Ok(row)
    }

    /// Insert a user row if absent. Password material starts out unset.
    pub fn upsert_user(&self, uid: u32) -> FsResult<()> {
        let conn = self.conn.lock();
        conn.execute("INSERT OR IGNORE INTO users (uid) VALUES (?1)", params![uid])?;
        Ok(())
    }

    pub fn set_credentials(&self, uid: u32, hash: &str, salt: &str) -> FsResult<()> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE users SET password_hash = ?2, salt = ?3 WHERE uid = ?1",
            params![uid, hash, salt],
        )?;
        if n == 0 {
            return Err(FsError::not_found(format!("no user {uid}")));
        }
        Ok(())
    }

    pub fn credentials(&self, uid: u32) -> FsResult<Option<Credentials>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT password_hash, salt FROM users WHERE uid = ?1",
                params![uid],
                |row| {
                    let hash: Option<String> = row.get(0)?;
                    let salt: Option<String> = row.get(1)?;
                    Ok(hash.zip(salt))
                },
            )
            .optional()?;
        Ok(row.flatten().map(|(password_hash, salt)| Credentials {
            password_hash,
            salt,
        }))
    }

    pub fn ensure_group(&self, gid: u32) -> FsResult<()> {
        let conn = self.conn.lock();
        conn.execute("INSERT OR IGNORE INTO groups (gid) VALUES (?1)", params![gid])?;
        Ok(())
    }

    pub fn set_user_group(&self, uid: u32, gid: u32) -> FsResult<()> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE users SET gid = ?2 WHERE uid = ?1",
            params![uid, gid],
        )?;
        if n == 0 {
            return Err(FsError::not_found(format!("no user {uid}")));
        }
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub fn file_by_ino(&self, ino: u64) -> FsResult<Option<FileRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT kind, permissions, owner_uid, group_gid FROM files WHERE ino = ?1",
                params![ino_to_db(ino)],
                |row| {
                    let kind: u8 = row.get(0)?;
                    Ok(FileRecord {
                        ino,
                        kind: FileKind::try_from(kind).unwrap_or(FileKind::Regular),
                        permissions: row.get(1)?,
                        owner_uid: row.get(2)?,
                        group_gid: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn update_permissions(&self, ino: u64, permissions: u32) -> FsResult<()> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET permissions = ?2 WHERE ino = ?1",
            params![ino_to_db(ino), permissions],
        )?;
        if n == 0 {
            return Err(FsError::not_found(format!("no inode {ino}")));
        }
        Ok(())
    }

    pub fn update_owner_group(&self, ino: u64, owner_uid: u32, group_gid: Option<u32>) -> FsResult<()> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET owner_uid = ?2, group_gid = ?3 WHERE ino = ?1",
            params![ino_to_db(ino), owner_uid, group_gid],
        )?;
        if n == 0 {
            return Err(FsError::not_found(format!("no inode {ino}")));
        }
        Ok(())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn path(&self, path: &str) -> FsResult<Option<PathRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT path, ino FROM paths WHERE path = ?1",
                params![path],
                |row| {
                    let path: String = row.get(0)?;
                    let ino: String = row.get(1)?;
                    Ok((path, ino))
                },
            )
            .optional()?;
        match row {
            Some((path, ino)) => Ok(Some(PathRecord {
                path,
                ino: ino_from_db(&ino)?,
            })),
            None => Ok(None),
        }
    }

    pub fn paths_of(&self, ino: u64) -> FsResult<Vec<PathRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT path, ino FROM paths WHERE ino = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![ino_to_db(ino)], |row| {
            let path: String = row.get(0)?;
            let ino: String = row.get(1)?;
            Ok((path, ino))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (path, ino) = row?;
            out.push(PathRecord {
                path,
                ino: ino_from_db(&ino)?,
            });
        }
        Ok(out)
    }

    /// Oldest binding of an inode — the path operations act through when the
    /// caller addressed the file by inode alone.
    pub fn primary_path(&self, ino: u64) -> FsResult<Option<PathRecord>> {
        Ok(self.paths_of(ino)?.into_iter().next())
    }

    pub fn insert_path(&self, path: &str, ino: u64) -> FsResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO paths (path, ino) VALUES (?1, ?2)",
            params![path, ino_to_db(ino)],
        )?;
        Ok(())
    }

    // ========================================================================
    // Grouped mutations
    // ========================================================================

    /// Insert a new File together with its first Path binding.
    pub fn insert_entry(&self, file: &FileRecord, path: &str) -> FsResult<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO files (ino, kind, permissions, owner_uid, group_gid)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ino_to_db(file.ino),
                u8::from(file.kind),
                file.permissions,
                file.owner_uid,
                file.group_gid,
            ],
        )?;
        tx.execute(
            "INSERT INTO paths (path, ino) VALUES (?1, ?2)",
            params![path, ino_to_db(file.ino)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove one Path binding; when it was the last one, remove the File
    /// row too. Returns the number of bindings left.
    pub fn unlink_path(&self, path: &str) -> FsResult<u64> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let ino: Option<String> = tx
            .query_row("SELECT ino FROM paths WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .optional()?;
        let ino = ino.ok_or_else(|| FsError::not_found(format!("no path row for {path}")))?;

        tx.execute("DELETE FROM paths WHERE path = ?1", params![path])?;
        let remaining: u64 = tx.query_row(
            "SELECT COUNT(*) FROM paths WHERE ino = ?1",
            params![ino],
            |row| row.get(0),
        )?;
        if remaining == 0 {
            tx.execute("DELETE FROM files WHERE ino = ?1", params![ino])?;
        }

        tx.commit()?;
        Ok(remaining)
    }

    /// Remove a directory's single Path binding and its File row.
    ///
    /// Directories must have exactly one binding; a second one means the
    /// stores have diverged, which is surfaced, never repaired.
    pub fn remove_dir_entry(&self, path: &str, ino: u64) -> FsResult<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM paths WHERE path = ?1", params![path])?;
        let remaining: u64 = tx.query_row(
            "SELECT COUNT(*) FROM paths WHERE ino = ?1",
            params![ino_to_db(ino)],
            |row| row.get(0),
        )?;
        if remaining != 0 {
            return Err(FsError::mismatch(
                path,
                "directory inode has extra path bindings",
            ));
        }
        tx.execute("DELETE FROM files WHERE ino = ?1", params![ino_to_db(ino)])?;

        tx.commit()?;
        Ok(())
    }

    /// Move a Path binding. When the entry is a directory, every descendant
    /// binding moves with it in the same transaction.
    pub fn rename_path(&self, old: &str, new: &str, move_subtree: bool) -> FsResult<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let n = tx.execute(
            "UPDATE paths SET path = ?2 WHERE path = ?1",
            params![old, new],
        )?;
        if n == 0 {
            return Err(FsError::not_found(format!("no path row for {old}")));
        }
        if move_subtree {
            tx.execute(
                "UPDATE paths SET path = ?2 || substr(path, length(?1) + 1)
                 WHERE substr(path, 1, length(?1) + 1) = ?1 || '/'",
                params![old, new],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
