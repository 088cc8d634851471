//! `HttpEndpoint` against a loopback HTTP fixture serving canned replies.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

use sharp_sentinel::{
    DetectEndpoint, DetectionId, HttpEndpoint, MediaPart, NotificationChannel,
    NotificationRequest, DetectionMode,
};

struct Recorded {
    request_line: String,
    content_type: String,
    body: Vec<u8>,
}

/// Serve exactly one request with the given status, headers and body.
fn serve_once(
    status: &'static str,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
) -> (String, JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture");
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut content_length = 0usize;
        let mut content_type = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap(),
                    "content-type" => content_type = value.trim().to_string(),
                    _ => {}
                }
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).unwrap();

        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for (name, value) in &headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str("\r\n");
        let mut stream = stream;
        stream.write_all(response.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
        stream.flush().unwrap();

        Recorded {
            request_line: request_line.trim_end().to_string(),
            content_type,
            body: request_body,
        }
    });
    (base, handle)
}

fn endpoint(base: &str) -> HttpEndpoint {
    HttpEndpoint::new(base, Duration::from_secs(5)).expect("endpoint")
}

#[test]
fn webcam_frame_round_trip() {
    let (base, server) = serve_once(
        "200 OK",
        vec![
            ("Content-Type", "image/jpeg".to_string()),
            (
                "X-Detections",
                r#"{"has_detections": true, "detections": [{"id": 3, "confidence": 0.8, "box": [1, 2, 3, 4]}]}"#
                    .to_string(),
            ),
        ],
        b"annotated-jpeg".to_vec(),
    );

    let reply = endpoint(&base)
        .detect_frame(MediaPart::webcam_jpeg(b"frame-bytes"), 0.25)
        .expect("detect frame");
    let recorded = server.join().unwrap();

    assert_eq!(recorded.request_line, "POST /api/detect_webcam HTTP/1.1");
    assert!(recorded.content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&recorded.body);
    assert!(body.contains("name=\"file\"; filename=\"webcam.jpg\""));
    assert!(body.contains("frame-bytes"));
    assert!(body.contains("name=\"confidence\"\r\n\r\n0.25\r\n"));

    assert_eq!(reply.media, b"annotated-jpeg");
    assert!(reply.manifest.has_detections);
    assert_eq!(reply.manifest.detections[0].id, Some(DetectionId::from(3u64)));
}

#[test]
fn missing_manifest_header_is_an_error() {
    let (base, server) = serve_once("200 OK", Vec::new(), b"annotated".to_vec());

    let result = endpoint(&base).detect_frame(MediaPart::webcam_jpeg(b"frame"), 0.25);
    server.join().unwrap();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("X-Detections"));
}

#[test]
fn server_errors_are_reported_with_status() {
    let (base, server) = serve_once(
        "500 Internal Server Error",
        vec![("Content-Type", "application/json".to_string())],
        br#"{"error": "model not loaded"}"#.to_vec(),
    );

    let result = endpoint(&base).detect_frame(MediaPart::webcam_jpeg(b"frame"), 0.25);
    server.join().unwrap();

    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("500"));
    assert!(message.contains("model not loaded"));
}

#[test]
fn video_upload_carries_representative_frame() {
    let (base, server) = serve_once(
        "200 OK",
        vec![
            ("Content-Type", "video/mp4".to_string()),
            ("X-Detections", r#"{"has_detections": false, "detections": null}"#.to_string()),
            ("X-Detection-Image", r#"{"image": "ZnJhbWU="}"#.to_string()),
        ],
        b"mp4".to_vec(),
    );

    let media = MediaPart {
        file_name: "hall.mp4",
        content_type: "video/mp4",
        bytes: b"video-bytes",
    };
    let reply = endpoint(&base).detect_upload(media, 0.5).expect("detect upload");
    let recorded = server.join().unwrap();

    assert_eq!(recorded.request_line, "POST /api/detect HTTP/1.1");
    assert!(String::from_utf8_lossy(&recorded.body).contains("Content-Type: video/mp4"));
    assert!(!reply.manifest.is_positive());
    assert_eq!(reply.detection_image.as_deref(), Some("ZnJhbWU="));
    assert_eq!(reply.media, b"mp4");
}

#[test]
fn notification_is_posted_as_json() {
    let (base, server) = serve_once(
        "200 OK",
        vec![("Content-Type", "application/json".to_string())],
        br#"{"message": "Notification sent"}"#.to_vec(),
    );
    let channel = NotificationChannel::Sms {
        number: "+5511999990000".to_string(),
    };
    let request =
        NotificationRequest::for_channel(&channel, DetectionMode::Webcam, None).unwrap();

    let ack = endpoint(&base).send_notification(&request).expect("notify");
    let recorded = server.join().unwrap();

    assert_eq!(recorded.request_line, "POST /api/send_notification HTTP/1.1");
    assert_eq!(recorded.content_type, "application/json");
    let sent: serde_json::Value = serde_json::from_slice(&recorded.body).unwrap();
    assert_eq!(sent["notification_type"], "sms");
    assert_eq!(sent["sms_number"], "+5511999990000");
    assert!(sent["email_address"].is_null());
    assert_eq!(ack.0["message"], "Notification sent");
}
