// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Storage backend tests.

use std::net::SocketAddr;

use vaultic_core::proto::PrivilegeLevel;
use vaultic_core::store::{
    BlobStore, DirBlobStore, JsonUserStore, MemoryBlobStore, MemoryUserStore, ServerDataManager,
    StoreError, UserRecord, UserStore,
};

fn record(email: &str, privilege: PrivilegeLevel) -> UserRecord {
    UserRecord {
        email: email.into(),
        password: "pw".into(),
        privilege,
    }
}

fn peer(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

#[test]
fn test_memory_user_store_create_and_update() {
    let store = MemoryUserStore::new();
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.lookup("a@b.c").unwrap().is_none());

    store.create(record("a@b.c", PrivilegeLevel::Admin)).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert!(matches!(
        store.create(record("a@b.c", PrivilegeLevel::User)),
        Err(StoreError::AlreadyExists(_))
    ));

    let mut updated = record("a@b.c", PrivilegeLevel::Admin);
    updated.password = "changed".into();
    store.update(updated).unwrap();
    assert_eq!(store.lookup("a@b.c").unwrap().unwrap().password, "changed");

    assert!(matches!(
        store.update(record("ghost@b.c", PrivilegeLevel::User)),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_memory_blob_store_listing_is_sorted() {
    let store = MemoryBlobStore::new();
    store.write("u@v.w", "b.txt", b"2").unwrap();
    store.write("u@v.w", "a.txt", b"1").unwrap();
    store.write("u@v.w", "docs/c.txt", b"3").unwrap();

    assert_eq!(
        store.list("u@v.w").unwrap(),
        vec!["a.txt", "b.txt", "docs/c.txt"]
    );
    assert!(store.exists("u@v.w", "a.txt").unwrap());
    assert!(!store.exists("u@v.w", "z.txt").unwrap());
    assert!(store.list("nobody@v.w").unwrap().is_empty());

    store.delete("u@v.w", "a.txt").unwrap();
    assert!(matches!(
        store.delete("u@v.w", "a.txt"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_blob_store_rejects_traversal() {
    let store = MemoryBlobStore::new();
    for bad in ["../escape", "/abs", "a/../b", "a\\b", ""] {
        assert!(
            matches!(
                store.write("u@v.w", bad, b"x"),
                Err(StoreError::InvalidPath(_))
            ),
            "accepted {bad:?}"
        );
    }
}

#[test]
fn test_dir_blob_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirBlobStore::open(dir.path()).unwrap();

    store.write("u@v.w", "notes/today.txt", b"hello").unwrap();
    store.write("u@v.w", "top.txt", b"top").unwrap();

    assert!(store.exists("u@v.w", "notes/today.txt").unwrap());
    assert_eq!(
        store.list("u@v.w").unwrap(),
        vec!["notes/today.txt", "top.txt"]
    );

    // Bytes land on disk under the user's own tree
    let on_disk = std::fs::read(dir.path().join("u@v.w/notes/today.txt")).unwrap();
    assert_eq!(on_disk, b"hello");

    store.delete("u@v.w", "top.txt").unwrap();
    assert_eq!(store.list("u@v.w").unwrap(), vec!["notes/today.txt"]);
    assert!(matches!(
        store.delete("u@v.w", "top.txt"),
        Err(StoreError::NotFound(_))
    ));

    // Another user's tree stays empty
    assert!(store.list("other@v.w").unwrap().is_empty());
}

#[test]
fn test_json_user_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    {
        let store = JsonUserStore::open(&path).unwrap();
        store.create(record("a@b.c", PrivilegeLevel::Admin)).unwrap();
        store.create(record("d@e.f", PrivilegeLevel::User)).unwrap();
    }

    let reopened = JsonUserStore::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), 2);
    let admin = reopened.lookup("a@b.c").unwrap().unwrap();
    assert_eq!(admin.privilege, PrivilegeLevel::Admin);
}

#[test]
fn test_session_table_is_exclusive_per_peer_and_account() {
    let data = ServerDataManager::in_memory();

    assert!(data.login_session(peer(1000), "a@b.c"));
    // Same peer cannot hold two sessions
    assert!(!data.login_session(peer(1000), "d@e.f"));
    // Same account cannot be active on two connections
    assert!(!data.login_session(peer(2000), "a@b.c"));
    // A different pair is fine
    assert!(data.login_session(peer(2000), "d@e.f"));

    assert_eq!(data.session_user(peer(1000)).as_deref(), Some("a@b.c"));
    assert_eq!(data.logout_session(peer(1000)).as_deref(), Some("a@b.c"));
    assert!(data.session_user(peer(1000)).is_none());

    // Released account may log in elsewhere
    assert!(data.login_session(peer(3000), "a@b.c"));
}

#[test]
fn test_interaction_log_records_in_order() {
    let data = ServerDataManager::in_memory();
    data.log("a@b.c", "Account registered").unwrap();
    data.log("a@b.c", "Uploaded report.pdf").unwrap();

    let entries = data.interactions().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "Account registered");
    assert_eq!(entries[1].message, "Uploaded report.pdf");
    assert!(entries[0].timestamp > 0);
}

#[test]
fn test_persistent_manager_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let data = ServerDataManager::persistent(dir.path()).unwrap();

    data.create_user(record("a@b.c", PrivilegeLevel::Admin))
        .unwrap();
    data.write_file("a@b.c", "x.bin", &[1, 2, 3]).unwrap();
    data.log("a@b.c", "Uploaded x.bin").unwrap();

    assert!(dir.path().join("users.json").is_file());
    assert!(dir.path().join("logs.json").is_file());
    assert!(dir.path().join("files/a@b.c/x.bin").is_file());
}
