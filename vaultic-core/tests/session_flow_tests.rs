// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end session tests over loopback TCP.
//!
//! Each test starts a real server on an ephemeral port and drives it with
//! real clients, so the whole stack is exercised: framing, key exchange,
//! encrypted envelopes, and the session state machines on both sides.

use vaultic_core::proto::PrivilegeLevel;
use vaultic_core::session::{FileClient, FileServer, UploadItem};
use vaultic_core::store::ServerDataManager;

fn start_server() -> FileServer {
    FileServer::start("127.0.0.1:0", ServerDataManager::in_memory()).unwrap()
}

fn connect(server: &FileServer) -> FileClient {
    FileClient::connect(server.local_addr()).unwrap()
}

fn item(name: &str, bytes: &[u8]) -> UploadItem {
    UploadItem {
        name: name.into(),
        bytes: bytes.to_vec(),
    }
}

#[test]
fn test_first_registered_account_is_admin() {
    let server = start_server();

    let first = connect(&server);
    let (success, message, level) = first.register("root@example.com", "pw1").unwrap();
    assert!(success, "{message}");
    assert_eq!(message, "Successfully registered account");
    assert_eq!(level, Some(PrivilegeLevel::Admin));

    let second = connect(&server);
    let (success, _, level) = second.register("user@example.com", "pw2").unwrap();
    assert!(success);
    assert_eq!(level, Some(PrivilegeLevel::User));
}

#[test]
fn test_duplicate_registration_is_refused() {
    let server = start_server();

    let first = connect(&server);
    assert!(first.register("dup@example.com", "pw").unwrap().0);

    let second = connect(&server);
    let (success, message, level) = second.register("dup@example.com", "other").unwrap();
    assert!(!success);
    assert_eq!(message, "Account already exists");
    assert_eq!(level, None);
}

#[test]
fn test_register_does_not_bind_a_session() {
    let server = start_server();
    let client = connect(&server);

    let (success, _, _) = client.register("new@example.com", "pw").unwrap();
    assert!(success);

    // Registration alone grants no session
    let (success, message, _) = client.view_files("new@example.com").unwrap();
    assert!(!success);
    assert_eq!(message, "Not logged in");

    // Logging in right after registering on the same connection works
    let (success, message, _) = client.login("new@example.com", "pw").unwrap();
    assert!(success, "{message}");
}

#[test]
fn test_register_while_logged_in_keeps_the_current_session() {
    let server = start_server();

    let first = connect(&server);
    first.register("one@example.com", "pw1").unwrap();
    first.login("one@example.com", "pw1").unwrap();

    // Registering another account succeeds and leaves the session intact
    let (success, message, _) = first.register("two@example.com", "pw2").unwrap();
    assert!(success, "{message}");
    let (success, _, _) = first.view_files("one@example.com").unwrap();
    assert!(success);

    // The new account is complete and usable from another connection
    let second = connect(&server);
    let (success, message, _) = second.login("two@example.com", "pw2").unwrap();
    assert!(success, "{message}");
}

#[test]
fn test_login_checks_account_and_password() {
    let server = start_server();

    let setup = connect(&server);
    setup.register("known@example.com", "right").unwrap();

    let client = connect(&server);
    let (success, message, _) = client.login("ghost@example.com", "x").unwrap();
    assert!(!success);
    assert_eq!(message, "Account does not exist");

    let (success, message, _) = client.login("known@example.com", "wrong").unwrap();
    assert!(!success);
    assert_eq!(message, "Incorrect password");

    let (success, message, level) = client.login("known@example.com", "right").unwrap();
    assert!(success, "{message}");
    assert_eq!(message, "Successfully logged in");
    assert_eq!(level, Some(PrivilegeLevel::Admin));
}

#[test]
fn test_account_cannot_be_active_on_two_connections() {
    let server = start_server();

    let first = connect(&server);
    first.register("solo@example.com", "pw").unwrap();
    let (success, _, _) = first.login("solo@example.com", "pw").unwrap();
    assert!(success);

    let second = connect(&server);
    let (success, message, _) = second.login("solo@example.com", "pw").unwrap();
    assert!(!success);
    assert_eq!(message, "Already logged in");

    // After the first connection releases it, the second may log in.
    first.logout().unwrap();
    let (success, _, _) = second.login("solo@example.com", "pw").unwrap();
    assert!(success);
}

#[test]
fn test_operations_require_login() {
    let server = start_server();
    let client = connect(&server);

    let (success, message, files) = client.view_files("anyone@example.com").unwrap();
    assert!(!success);
    assert_eq!(message, "Not logged in");
    assert!(files.is_empty());

    let outcomes = client.upload(vec![item("a.txt", b"data")]).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].message, "Not logged in");

    let (success, message) = client
        .remove_files("anyone@example.com", vec!["a.txt".into()])
        .unwrap();
    assert!(!success);
    assert_eq!(message, "Not logged in");

    let (success, message, _) = client.admin_data().unwrap();
    assert!(!success);
    assert_eq!(message, "Not logged in");

    let (success, message) = client.logout().unwrap();
    assert!(!success);
    assert_eq!(message, "Not logged in");
}

#[test]
fn test_upload_then_list_then_remove() {
    let server = start_server();
    let client = connect(&server);
    client.register("files@example.com", "pw").unwrap();
    client.login("files@example.com", "pw").unwrap();

    let (_, _, files) = client.view_files("files@example.com").unwrap();
    assert!(files.is_empty());

    let outcomes = client
        .upload(vec![item("a.txt", b"alpha"), item("b.txt", b"beta")])
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.success), "{outcomes:?}");
    assert_eq!(outcomes[0].message, "Successfully uploaded a.txt");

    let (success, message, files) = client.view_files("files@example.com").unwrap();
    assert!(success);
    assert_eq!(message, "Successfully viewed files");
    assert_eq!(files, vec!["a.txt", "b.txt"]);

    // Re-uploading an existing name fails per file, not per batch
    let outcomes = client
        .upload(vec![item("a.txt", b"again"), item("c.txt", b"gamma")])
        .unwrap();
    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].message, "File already exists");
    assert!(outcomes[1].success);

    let (success, message) = client
        .remove_files(
            "files@example.com",
            vec!["a.txt".into(), "missing.txt".into(), "c.txt".into()],
        )
        .unwrap();
    assert!(success);
    assert_eq!(message, "Successfully removed 2 file(s)");

    let (_, _, files) = client.view_files("files@example.com").unwrap();
    assert_eq!(files, vec!["b.txt"]);
}

#[test]
fn test_uploaded_bytes_survive_the_encrypted_path() {
    let server = start_server();
    let client = connect(&server);
    client.register("bytes@example.com", "pw").unwrap();
    client.login("bytes@example.com", "pw").unwrap();

    // Binary body with every byte value, larger than one read chunk
    let body: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
    let outcomes = client.upload(vec![item("blob.bin", &body)]).unwrap();
    assert!(outcomes[0].success, "{}", outcomes[0].message);

    let (_, _, files) = client.view_files("bytes@example.com").unwrap();
    assert_eq!(files, vec!["blob.bin"]);
}

#[test]
fn test_admin_may_target_other_users() {
    let server = start_server();

    let admin = connect(&server);
    admin.register("admin@example.com", "pw").unwrap();
    admin.login("admin@example.com", "pw").unwrap();

    let user = connect(&server);
    user.register("user@example.com", "pw").unwrap();
    user.login("user@example.com", "pw").unwrap();
    user.upload(vec![item("private.txt", b"contents")]).unwrap();

    // Admin sees the other user's folder
    let (success, _, files) = admin.view_files("user@example.com").unwrap();
    assert!(success);
    assert_eq!(files, vec!["private.txt"]);

    // And may remove from it
    let (success, message) = admin
        .remove_files("user@example.com", vec!["private.txt".into()])
        .unwrap();
    assert!(success);
    assert_eq!(message, "Successfully removed 1 file(s)");

    // The plain user may not look at the admin's folder
    let (success, message, _) = user.view_files("admin@example.com").unwrap();
    assert!(!success);
    assert_eq!(message, "Insufficient permission");
}

#[test]
fn test_admin_data_requires_admin_level() {
    let server = start_server();

    let admin = connect(&server);
    admin.register("admin@example.com", "pw").unwrap();
    admin.login("admin@example.com", "pw").unwrap();

    let user = connect(&server);
    user.register("user@example.com", "pw").unwrap();
    user.login("user@example.com", "pw").unwrap();

    let (success, message, data) = user.admin_data().unwrap();
    assert!(!success);
    assert_eq!(message, "Insufficient permission");
    assert!(data.is_none());

    let (success, message, data) = admin.admin_data().unwrap();
    assert!(success, "{message}");
    assert_eq!(message, "Successfully retrieved data");
    let data = data.unwrap();
    assert_eq!(data.users.len(), 2);
    // Registrations were logged
    assert!(data
        .interactions
        .iter()
        .any(|entry| entry.message == "Account registered"));
}

#[test]
fn test_heartbeat_roundtrip() {
    let server = start_server();
    let client = connect(&server);
    client.ping().unwrap();
}

#[test]
fn test_disconnect_releases_the_session() {
    let server = start_server();

    {
        let mut client = connect(&server);
        client.register("drop@example.com", "pw").unwrap();
        let (success, _, _) = client.login("drop@example.com", "pw").unwrap();
        assert!(success);
        client.shutdown();
    }

    // The dropped connection's session is released server-side, so the
    // account can log in again.
    let client = connect(&server);
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let (success, message, _) = client.login("drop@example.com", "pw").unwrap();
        if success {
            break;
        }
        assert_eq!(message, "Already logged in");
        assert!(
            std::time::Instant::now() < deadline,
            "session was never released"
        );
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}
