mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{FakeEndpoint, Reply};
use sharp_sentinel::upload::detect_upload;
use sharp_sentinel::{
    AlertState, MediaKind, NotificationChannel, Notifier, UploadError, UploadRequest,
    DEFAULT_UPLOAD_LIMIT_BYTES,
};

fn email() -> NotificationChannel {
    NotificationChannel::Email {
        address: "guard@example.com".to_string(),
    }
}

#[test]
fn oversized_upload_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.mp4");
    std::fs::File::create(&path)
        .unwrap()
        .set_len(80 * 1024 * 1024)
        .unwrap();
    let endpoint = Arc::new(FakeEndpoint::new(Vec::new()));

    let err = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap_err();

    assert!(matches!(err, UploadError::TooLarge { size, .. } if size == 80 * 1024 * 1024));
    assert_eq!(endpoint.upload_calls.load(Ordering::SeqCst), 0);
    assert!(endpoint.sent_notifications().is_empty());
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    std::fs::write(&path, b"%PDF").unwrap();

    let err = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap_err();
    assert!(matches!(err, UploadError::UnsupportedMedia(_)));
}

#[test]
fn image_detection_notifies_with_annotated_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bag.jpg");
    std::fs::write(&path, common::annotated_jpeg()).unwrap();
    let endpoint = Arc::new(FakeEndpoint::new(vec![Reply::ids(&["1"])]));
    let notifier = Notifier::new(email(), endpoint.clone());

    let request = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap();
    let outcome = detect_upload(endpoint.as_ref(), &notifier, &request, 0.25).unwrap();

    assert_eq!(outcome.kind, MediaKind::Image);
    assert_eq!(outcome.alert, AlertState::Detected);
    assert!(outcome.notification_sent);
    let sent = endpoint.sent_notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].detection_mode, "Imagem");
    assert_eq!(sent[0].notification_type, "email");
    assert_eq!(sent[0].email_address.as_deref(), Some("guard@example.com"));
    assert_eq!(sent[0].sms_number, None);
    assert_eq!(
        sent[0].image_base64.as_deref(),
        Some(sharp_sentinel::notify::encode_image(endpoint.annotated()).as_str())
    );

    let written = outcome.write_media(dir.path()).unwrap();
    assert_eq!(written, dir.path().join("detected_objects.jpg"));
}

#[test]
fn video_detection_uses_representative_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hall.mp4");
    std::fs::write(&path, b"fake mp4").unwrap();
    let endpoint = Arc::new(
        FakeEndpoint::new(vec![Reply::ids(&["7"])]).with_detection_image("ZnJhbWU="),
    );
    let notifier = Notifier::new(email(), endpoint.clone());

    let request = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap();
    let outcome = detect_upload(endpoint.as_ref(), &notifier, &request, 0.5).unwrap();

    assert_eq!(outcome.kind, MediaKind::Video);
    let sent = endpoint.sent_notifications();
    assert_eq!(sent[0].detection_mode, "Vídeo");
    assert_eq!(sent[0].image_base64.as_deref(), Some("ZnJhbWU="));
}

#[test]
fn clean_upload_does_not_notify() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.png");
    std::fs::write(&path, b"png").unwrap();
    let endpoint = Arc::new(FakeEndpoint::new(vec![Reply::ids(&[])]));
    let notifier = Notifier::new(email(), endpoint.clone());

    let request = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap();
    let outcome = detect_upload(endpoint.as_ref(), &notifier, &request, 0.25).unwrap();

    assert_eq!(outcome.alert, AlertState::NoDetections);
    assert!(!outcome.notification_sent);
    assert!(endpoint.sent_notifications().is_empty());
    assert_eq!(endpoint.upload_calls.load(Ordering::SeqCst), 1);
}
