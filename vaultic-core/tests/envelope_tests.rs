// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Envelope encode/decode tests.

use vaultic_core::proto::{
    decode_envelope, encode_envelope, AuthPayload, Envelope, LoginRequest, LoginResponse,
    PrivilegeLevel, RemoveFilesRequest, UploadFile, UploadResult, ViewFilesRequest,
};

#[test]
fn test_action_discriminator_is_snake_case() {
    let text = encode_envelope(&Envelope::UploadStart).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["action"], "upload_start");

    let text = encode_envelope(&Envelope::ViewAdminDataRequest).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["action"], "view_admin_data_request");
}

#[test]
fn test_login_request_roundtrip() {
    let envelope = Envelope::Login(LoginRequest {
        register_user: true,
        email: "user@example.com".into(),
        password: "secret".into(),
    });
    let decoded = decode_envelope(&encode_envelope(&envelope).unwrap()).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn test_privilege_level_encodes_as_integer() {
    let envelope = Envelope::LoginResponse(LoginResponse {
        success: true,
        message: "Successfully registered account".into(),
        level: Some(PrivilegeLevel::Admin),
    });
    let text = encode_envelope(&envelope).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["level"], 2);

    assert_eq!(decode_envelope(&text).unwrap(), envelope);
}

#[test]
fn test_auth_payload_omits_absent_coordinates() {
    let confirmation = Envelope::Auth(AuthPayload {
        authenticated: true,
        x: None,
        y: None,
    });
    let text = encode_envelope(&confirmation).unwrap();
    assert!(!text.contains("\"x\""));
    assert!(!text.contains("\"y\""));

    let decoded = decode_envelope(&text).unwrap();
    assert_eq!(decoded, confirmation);
}

#[test]
fn test_dispatch_by_discriminator() {
    let text = r#"{"action":"view_files_request","user_email":"user@example.com"}"#;
    match decode_envelope(text).unwrap() {
        Envelope::ViewFilesRequest(ViewFilesRequest { user_email }) => {
            assert_eq!(user_email, "user@example.com");
        }
        other => panic!("wrong variant: {other:?}"),
    }

    let text = r#"{"action":"remove_files","user_email":"a@b.c","files":["x.txt","y.txt"]}"#;
    match decode_envelope(text).unwrap() {
        Envelope::RemoveFiles(RemoveFilesRequest { user_email, files }) => {
            assert_eq!(user_email, "a@b.c");
            assert_eq!(files, vec!["x.txt", "y.txt"]);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn test_upload_file_announcement() {
    let envelope = Envelope::UploadFile(UploadFile {
        name: "report.pdf".into(),
    });
    let text = encode_envelope(&envelope).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["action"], "upload_file");
    assert_eq!(value["name"], "report.pdf");
}

#[test]
fn test_upload_result_session_rejection_flag() {
    // A session-level refusal carries the structured flag
    let refusal = Envelope::UploadResult(UploadResult {
        success: false,
        message: "Not logged in".into(),
        path: None,
        session_rejected: true,
    });
    let text = encode_envelope(&refusal).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["session_rejected"], true);
    assert_eq!(decode_envelope(&text).unwrap(), refusal);

    // Per-file failures omit the flag on the wire
    let per_file = Envelope::UploadResult(UploadResult {
        success: false,
        message: "File already exists".into(),
        path: None,
        session_rejected: false,
    });
    let text = encode_envelope(&per_file).unwrap();
    assert!(!text.contains("session_rejected"));

    // Peers that never send the field decode to an ordinary failure
    let legacy = r#"{"action":"upload_result","success":false,"message":"File already exists"}"#;
    match decode_envelope(legacy).unwrap() {
        Envelope::UploadResult(result) => {
            assert!(!result.session_rejected);
            assert_eq!(result.path, None);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn test_unknown_action_is_an_error() {
    assert!(decode_envelope(r#"{"action":"format_disk"}"#).is_err());
    assert!(decode_envelope(r#"{"no_action":true}"#).is_err());
    assert!(decode_envelope("not json at all").is_err());
}

#[test]
fn test_missing_fields_are_an_error() {
    // login without a password must not parse
    assert!(
        decode_envelope(r#"{"action":"login","register_user":false,"email":"a@b.c"}"#).is_err()
    );
}
