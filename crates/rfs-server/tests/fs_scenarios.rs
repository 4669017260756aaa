//! End-to-end scenarios against a fresh tree: a temp backing root, in-memory
//! metadata, the admin (uid 5000), and one member user (uid 5001, group
//! 6000).

use std::sync::Arc;

use tempfile::TempDir;

use rfs_core::{
    Accounts, FsConfig, Filesystem, GetAttrOutcome, MetaStore, User, ADMIN_UID,
};
use rfs_server::PasswordAccounts;
use rfs_types::{FileKind, SetAttrRequest};

struct Harness {
    fs: Filesystem,
    _root: TempDir,
    accounts: Arc<PasswordAccounts>,
}

async fn setup() -> Harness {
    let root = TempDir::new().unwrap();
    let meta = Arc::new(MetaStore::in_memory().unwrap());
    let accounts = Arc::new(PasswordAccounts::new(meta.clone()));
    let config = FsConfig::ephemeral(root.path());
    let fs = Filesystem::new(&config, meta, accounts.clone())
        .await
        .unwrap();

    accounts.create_user(5001, "pw").await.unwrap();
    accounts.assign_group(5001, 6000).await.unwrap();

    Harness {
        fs,
        _root: root,
        accounts,
    }
}

fn admin() -> User {
    User {
        uid: ADMIN_UID,
        gid: None,
    }
}

fn member() -> User {
    User {
        uid: 5001,
        gid: Some(6000),
    }
}

fn outsider() -> User {
    User {
        uid: 5077,
        gid: None,
    }
}

#[tokio::test]
async fn s1_mkdir_then_readdir() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();

    let entry = h.fs.mkdir(&member(), root, "docs").await.unwrap();
    assert_eq!(entry.kind, FileKind::Directory);
    assert_eq!(entry.owner, 5001);
    assert_eq!(entry.group, Some(6000));
    assert_eq!(entry.permissions, 0o755);
    assert_eq!(entry.name, "docs");
    assert_eq!(entry.path, "/docs");

    let listing = h.fs.readdir(&member(), root).await.unwrap();
    let docs = listing.iter().find(|e| e.name == "docs").unwrap();
    assert_eq!(docs.ino, entry.ino);
}

#[tokio::test]
async fn s2_create_write_read_roundtrip() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let docs = h.fs.mkdir(&member(), root, "docs").await.unwrap();

    let hello = h.fs.create(&member(), docs.ino, "hello.txt").await.unwrap();
    assert_eq!(hello.kind, FileKind::Regular);
    assert_eq!(hello.permissions, 0o644);

    let written = h
        .fs
        .write(&member(), hello.ino, 0, b"ciao mondo")
        .await
        .unwrap();
    assert_eq!(written, 10);

    let data = h.fs.read(&member(), hello.ino, 0, 4096).await.unwrap();
    assert_eq!(data, b"ciao mondo");
}

#[tokio::test]
async fn s3_permission_denial_and_admin_override() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let hello = h.fs.create(&member(), root, "hello.txt").await.unwrap();
    h.fs.write(&member(), hello.ino, 0, b"ciao mondo")
        .await
        .unwrap();

    let change = SetAttrRequest {
        perm: Some(0),
        ..Default::default()
    };
    let entry = h.fs.setattr(&member(), hello.ino, &change).await.unwrap();
    assert_eq!(entry.permissions, 0);

    let err = h.fs.read(&outsider(), hello.ino, 0, 4096).await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");
    assert_eq!(err.http_status(), 403);

    // The owner shut themselves out too; only the admin gets through.
    let err = h.fs.read(&member(), hello.ino, 0, 4096).await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");
    let data = h.fs.read(&admin(), hello.ino, 0, 4096).await.unwrap();
    assert_eq!(data, b"ciao mondo");
}

#[tokio::test]
async fn s4_hardlink_survives_unlink_of_first_name() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let docs = h.fs.mkdir(&member(), root, "docs").await.unwrap();
    let hello = h.fs.create(&member(), docs.ino, "hello.txt").await.unwrap();
    h.fs.write(&member(), hello.ino, 0, b"ciao mondo")
        .await
        .unwrap();

    let alias = h
        .fs
        .hardlink(&member(), hello.ino, docs.ino, "alias")
        .await
        .unwrap();
    assert_eq!(alias.ino, hello.ino);
    assert!(alias.nlinks >= 2);

    h.fs.unlink(&member(), docs.ino, "hello.txt").await.unwrap();

    // One binding remains, so the inode and its content survive.
    let data = h.fs.read(&member(), hello.ino, 0, 32).await.unwrap();
    assert_eq!(data, b"ciao mondo");
    let entry = h.fs.lookup(&member(), docs.ino, "alias").await.unwrap();
    assert_eq!(entry.ino, hello.ino);

    // Removing the last binding removes the inode record as well.
    h.fs.unlink(&member(), docs.ino, "alias").await.unwrap();
    let err = h.fs.read(&member(), hello.ino, 0, 32).await.unwrap_err();
    assert_eq!(err.identifier(), "ENOENT");
}

#[tokio::test]
async fn s5_rename_across_directories() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let docs = h.fs.mkdir(&member(), root, "docs").await.unwrap();
    let archive = h.fs.mkdir(&member(), root, "archive").await.unwrap();
    let alias = h.fs.create(&member(), docs.ino, "alias").await.unwrap();

    let moved = h
        .fs
        .rename(&member(), docs.ino, "alias", archive.ino, "saved.txt")
        .await
        .unwrap();
    assert_eq!(moved.path, "/archive/saved.txt");
    assert_eq!(moved.ino, alias.ino);

    let err = h.fs.lookup(&member(), docs.ino, "alias").await.unwrap_err();
    assert_eq!(err.identifier(), "ENOENT");
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn s6_symlink_and_readlink() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();

    let link = h
        .fs
        .symlink(&member(), "/archive/saved.txt", root, "link")
        .await
        .unwrap();
    assert_eq!(link.kind, FileKind::Symlink);
    assert_eq!(link.owner, 5001);

    let target = h.fs.readlink(link.ino).await.unwrap();
    assert_eq!(target, "/archive/saved.txt");

    // Not a symlink.
    let err = h.fs.readlink(root).await.unwrap_err();
    assert_eq!(err.identifier(), "EINVAL");
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[tokio::test]
async fn rejects_traversal_and_illegal_names() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();

    for name in ["..", ".", "", "a/b", "a\\b"] {
        let err = h.fs.lookup(&member(), root, name).await.unwrap_err();
        assert_eq!(err.identifier(), "EINVAL", "name {name:?}");
    }
    let err = h
        .fs
        .rename(&member(), root, "/", root, "elsewhere")
        .await
        .unwrap_err();
    assert_eq!(err.identifier(), "EINVAL");
}

#[tokio::test]
async fn unlink_directory_is_eisdir_and_rmdir_file_is_enotdir() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    h.fs.mkdir(&member(), root, "d").await.unwrap();
    h.fs.create(&member(), root, "f").await.unwrap();

    let err = h.fs.unlink(&member(), root, "d").await.unwrap_err();
    assert_eq!(err.identifier(), "EISDIR");

    let err = h.fs.rmdir(&member(), root, "f").await.unwrap_err();
    assert_eq!(err.identifier(), "ENOTDIR");
}

#[tokio::test]
async fn rmdir_refuses_non_empty_directory() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let d = h.fs.mkdir(&member(), root, "d").await.unwrap();
    h.fs.create(&member(), d.ino, "child").await.unwrap();

    let err = h.fs.rmdir(&member(), root, "d").await.unwrap_err();
    assert_eq!(err.identifier(), "ENOTEMPTY");
    assert_eq!(err.http_status(), 409);

    h.fs.unlink(&member(), d.ino, "child").await.unwrap();
    h.fs.rmdir(&member(), root, "d").await.unwrap();
    let err = h.fs.readdir(&member(), d.ino).await.unwrap_err();
    assert_eq!(err.identifier(), "ENOENT");
}

#[tokio::test]
async fn hardlink_of_directory_is_refused() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let d = h.fs.mkdir(&member(), root, "d").await.unwrap();

    let err = h
        .fs
        .hardlink(&member(), d.ino, root, "d2")
        .await
        .unwrap_err();
    assert_eq!(err.identifier(), "EISDIR");
}

#[tokio::test]
async fn create_collision_is_eexist() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    h.fs.create(&member(), root, "f").await.unwrap();

    let err = h.fs.create(&member(), root, "f").await.unwrap_err();
    assert_eq!(err.identifier(), "EEXIST");
    assert_eq!(err.http_status(), 409);

    let err = h.fs.mkdir(&member(), root, "f").await.unwrap_err();
    assert_eq!(err.identifier(), "EEXIST");
}

#[tokio::test]
async fn rename_onto_existing_entry_is_eexist() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    h.fs.create(&member(), root, "a").await.unwrap();
    h.fs.create(&member(), root, "b").await.unwrap();

    let err = h
        .fs
        .rename(&member(), root, "a", root, "b")
        .await
        .unwrap_err();
    assert_eq!(err.identifier(), "EEXIST");
}

#[tokio::test]
async fn read_past_eof_returns_zero_bytes() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();
    h.fs.write(&member(), f.ino, 0, b"short").await.unwrap();

    let data = h.fs.read(&member(), f.ino, 500, 100).await.unwrap();
    assert!(data.is_empty());
}

#[tokio::test]
async fn write_past_eof_zero_fills_gap() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();

    h.fs.write(&member(), f.ino, 4, b"xy").await.unwrap();
    let data = h.fs.read(&member(), f.ino, 0, 16).await.unwrap();
    assert_eq!(data, b"\0\0\0\0xy");
}

#[tokio::test]
async fn setattr_rejects_out_of_range_mode() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();

    let change = SetAttrRequest {
        perm: Some(0o1000),
        ..Default::default()
    };
    let err = h.fs.setattr(&member(), f.ino, &change).await.unwrap_err();
    assert_eq!(err.identifier(), "EINVAL");
}

#[tokio::test]
async fn setattr_is_idempotent_on_permissions() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();

    let change = SetAttrRequest {
        perm: Some(0o640),
        ..Default::default()
    };
    let first = h.fs.setattr(&member(), f.ino, &change).await.unwrap();
    let second = h.fs.setattr(&member(), f.ino, &change).await.unwrap();
    assert_eq!(first.permissions, 0o640);
    assert_eq!(second.permissions, 0o640);
    assert_eq!(first.ino, second.ino);
    assert_eq!(first.size, second.size);

    match h.fs.getattr(&member(), f.ino, None).await.unwrap() {
        GetAttrOutcome::Entry(entry) => assert_eq!(entry.permissions, 0o640),
        GetAttrOutcome::NotModified => panic!("unconditional getattr returned 304"),
    }
}

#[tokio::test]
async fn setattr_ownership_transfer_policy() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&admin(), root, "f").await.unwrap();
    assert_eq!(f.owner, ADMIN_UID);

    // Known uid: the file moves to that user and that user's primary group.
    let change = SetAttrRequest {
        uid: Some(5001),
        ..Default::default()
    };
    let entry = h.fs.setattr(&admin(), f.ino, &change).await.unwrap();
    assert_eq!(entry.owner, 5001);
    assert_eq!(entry.group, Some(6000));

    // Unknown uid: ownership falls back to the caller.
    let change = SetAttrRequest {
        uid: Some(9999),
        ..Default::default()
    };
    let entry = h.fs.setattr(&admin(), f.ino, &change).await.unwrap();
    assert_eq!(entry.owner, ADMIN_UID);
    assert_eq!(entry.group, None);

    // Group change without an ownership change is refused.
    let change = SetAttrRequest {
        gid: Some(6000),
        ..Default::default()
    };
    let err = h.fs.setattr(&admin(), f.ino, &change).await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");
}

#[tokio::test]
async fn setattr_truncates_files_but_not_directories() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();
    h.fs.write(&member(), f.ino, 0, b"hello world").await.unwrap();

    let change = SetAttrRequest {
        size: Some(5),
        ..Default::default()
    };
    let entry = h.fs.setattr(&member(), f.ino, &change).await.unwrap();
    assert_eq!(entry.size, 5);
    assert_eq!(h.fs.read(&member(), f.ino, 0, 100).await.unwrap(), b"hello");

    let d = h.fs.mkdir(&member(), root, "d").await.unwrap();
    let err = h.fs.setattr(&member(), d.ino, &change).await.unwrap_err();
    assert_eq!(err.identifier(), "EISDIR");
}

#[tokio::test]
async fn conditional_getattr_returns_not_modified() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();
    h.fs.write(&member(), f.ino, 0, b"v1").await.unwrap();

    let entry = match h.fs.getattr(&member(), f.ino, None).await.unwrap() {
        GetAttrOutcome::Entry(entry) => entry,
        GetAttrOutcome::NotModified => panic!("unconditional getattr returned 304"),
    };

    // Client knows the current mtime: nothing to send.
    let outcome = h
        .fs
        .getattr(&member(), f.ino, Some(entry.mtime))
        .await
        .unwrap();
    assert!(matches!(outcome, GetAttrOutcome::NotModified));

    // A stale client mtime (one full second behind) gets the entry.
    let outcome = h
        .fs
        .getattr(&member(), f.ino, Some(entry.mtime - 1000))
        .await
        .unwrap();
    assert!(matches!(outcome, GetAttrOutcome::Entry(_)));
}

#[tokio::test]
async fn readdir_omits_children_the_caller_cannot_read() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let secret = h.fs.create(&member(), root, "secret").await.unwrap();
    h.fs.create(&member(), root, "public").await.unwrap();

    let change = SetAttrRequest {
        perm: Some(0o600),
        ..Default::default()
    };
    h.fs.setattr(&member(), secret.ino, &change).await.unwrap();

    let names = |entries: Vec<rfs_types::FileEntry>| {
        entries.into_iter().map(|e| e.name).collect::<Vec<_>>()
    };

    let listing = names(h.fs.readdir(&outsider(), root).await.unwrap());
    assert!(listing.contains(&"public".to_string()));
    assert!(!listing.contains(&"secret".to_string()));

    let listing = names(h.fs.readdir(&admin(), root).await.unwrap());
    assert!(listing.contains(&"secret".to_string()));
}

#[tokio::test]
async fn rename_of_directory_carries_descendants() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let docs = h.fs.mkdir(&member(), root, "docs").await.unwrap();
    let sub = h.fs.mkdir(&member(), docs.ino, "sub").await.unwrap();
    let f = h.fs.create(&member(), sub.ino, "deep.txt").await.unwrap();

    h.fs.rename(&member(), root, "docs", root, "archive")
        .await
        .unwrap();

    let entry = h.fs.lookup(&member(), sub.ino, "deep.txt").await.unwrap();
    assert_eq!(entry.path, "/archive/sub/deep.txt");
    assert_eq!(entry.ino, f.ino);

    // The whole subtree is still consistent between both stores.
    let listing = h.fs.readdir(&member(), sub.ino).await.unwrap();
    assert_eq!(listing.len(), 1);
}

#[tokio::test]
async fn write_permission_is_required_on_the_parent_for_child_mutation() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let d = h.fs.mkdir(&member(), root, "d").await.unwrap();

    // 0o755: group/other cannot write into the directory.
    let err = h.fs.create(&outsider(), d.ino, "f").await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");
    let err = h.fs.mkdir(&outsider(), d.ino, "sub").await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");

    h.fs.create(&member(), d.ino, "f").await.unwrap();
    let err = h.fs.unlink(&outsider(), d.ino, "f").await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");
}

#[tokio::test]
async fn reserved_file_write_provisions_a_user() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let entry = h
        .fs
        .lookup(&member(), root, "create-user.txt")
        .await
        .unwrap();

    h.fs.write(&member(), entry.ino, 0, b"5002 hunter2")
        .await
        .unwrap();

    // The collaborator ran: the new user can log in.
    let user = h.accounts.verify(5002, "hunter2").unwrap().unwrap();
    assert_eq!(user.uid, 5002);

    // The file now holds the outcome message, not the directive.
    let content = h.fs.read(&admin(), entry.ino, 0, 4096).await.unwrap();
    assert_eq!(content, b"created user 5002\n");

    // And the group side channel picks the new user up.
    let group_entry = h
        .fs
        .lookup(&member(), root, "create-group.txt")
        .await
        .unwrap();
    h.fs.write(&member(), group_entry.ino, 0, b"5002 6000")
        .await
        .unwrap();
    let user = h.accounts.verify(5002, "hunter2").unwrap().unwrap();
    assert_eq!(user.gid, Some(6000));
}

#[tokio::test]
async fn malformed_reserved_directive_reports_failure_in_file() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let entry = h
        .fs
        .lookup(&member(), root, "create-user.txt")
        .await
        .unwrap();

    let written = h
        .fs
        .write(&member(), entry.ino, 0, b"not a directive at all")
        .await
        .unwrap();
    // The write itself still reports its own byte count.
    assert_eq!(written, 22);

    let content = h.fs.read(&admin(), entry.ino, 0, 4096).await.unwrap();
    assert!(content.starts_with(b"error:"), "got {content:?}");
}

#[tokio::test]
async fn streaming_roundtrip() {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "big.bin").await.unwrap();

    // Three chunks, 100 KiB total: crosses the 64 KiB chunk boundary.
    let payload: Vec<u8> = (0..100 * 1024).map(|i| (i % 251) as u8).collect();
    let (tx, rx) = mpsc::channel(4);
    let sender = {
        let payload = payload.clone();
        tokio::spawn(async move {
            for part in payload.chunks(40 * 1024) {
                tx.send(Bytes::copy_from_slice(part)).await.unwrap();
            }
        })
    };
    let written = h.fs.write_stream(&member(), f.ino, 0, rx).await.unwrap();
    sender.await.unwrap();
    assert_eq!(written, payload.len() as u64);

    let mut streamed = Vec::new();
    let mut chunks = h.fs.read_stream(&member(), f.ino).await.unwrap();
    while let Some(chunk) = chunks.recv().await {
        streamed.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(streamed, payload);

    // Checks run before the first chunk: an unreadable file never streams.
    let change = SetAttrRequest {
        perm: Some(0),
        ..Default::default()
    };
    h.fs.setattr(&member(), f.ino, &change).await.unwrap();
    let err = h.fs.read_stream(&outsider(), f.ino).await.unwrap_err();
    assert_eq!(err.identifier(), "EACCES");
}

#[tokio::test]
async fn read_size_is_capped() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();
    let f = h.fs.create(&member(), root, "f").await.unwrap();

    // 2 MiB on disk, one read request for all of it: the cap holds it to 1 MiB.
    let payload = vec![7u8; 2 * 1024 * 1024];
    h.fs.write(&member(), f.ino, 0, &payload).await.unwrap();

    let data = h
        .fs
        .read(&member(), f.ino, 0, u64::MAX)
        .await
        .unwrap();
    assert_eq!(data.len(), 1024 * 1024);
}

#[tokio::test]
async fn first_start_provisions_root_admin_home_and_reserved_files() {
    let h = setup().await;
    let root = h.fs.root_ino().await.unwrap();

    let listing = h.fs.readdir(&admin(), root).await.unwrap();
    let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"admin"));
    assert!(names.contains(&"create-user.txt"));
    assert!(names.contains(&"create-group.txt"));

    let home = h.fs.lookup(&admin(), root, "admin").await.unwrap();
    assert_eq!(home.kind, FileKind::Directory);
    assert_eq!(home.owner, ADMIN_UID);

    // Root itself: directory, admin-owned, world-readable.
    match h.fs.getattr(&outsider(), root, None).await.unwrap() {
        GetAttrOutcome::Entry(entry) => {
            assert_eq!(entry.kind, FileKind::Directory);
            assert_eq!(entry.owner, ADMIN_UID);
            assert_eq!(entry.path, "/");
            assert_eq!(entry.name, "/");
        }
        GetAttrOutcome::NotModified => panic!("unconditional getattr returned 304"),
    }
}

#[tokio::test]
async fn on_disk_database_next_to_the_root_keeps_readdir_clean() {
    // The production layout: a real SQLite file as a sibling of the data
    // root, which does not exist yet — exactly what a first `rfs-server
    // --data-root` run sees.
    let dir = TempDir::new().unwrap();
    let data_root = dir.path().join("data");
    let db_path = dir.path().join("data-meta.db");

    let meta = Arc::new(MetaStore::open(&db_path).unwrap());
    let accounts = Arc::new(PasswordAccounts::new(meta.clone()));
    let config = FsConfig::new(&data_root, &db_path);
    let fs = Filesystem::new(&config, meta, accounts.clone())
        .await
        .unwrap();
    accounts.create_user(5001, "pw").await.unwrap();

    let root = fs.root_ino().await.unwrap();
    fs.mkdir(&member(), root, "docs").await.unwrap();

    // Every listing of "/" must stay clean: the database (and its -wal/-shm
    // companions) lives outside the tree, so no EIO mismatch.
    let listing = fs.readdir(&member(), root).await.unwrap();
    let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"docs"));
    assert!(names.contains(&"create-user.txt"));
    assert!(!names.iter().any(|n| n.contains("meta.db")));
}

#[tokio::test]
async fn disk_usage_reports_the_backing_volume() {
    let h = setup().await;
    let usage = h.fs.disk_usage().unwrap();
    assert!(usage.total > 0);
    assert!(usage.available <= usage.total);
}
