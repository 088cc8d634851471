use anyhow::Result;

use crate::detect::manifest::DetectionManifest;
use crate::notify::NotificationRequest;

/// Media file submitted as the multipart `file` field.
#[derive(Clone, Copy, Debug)]
pub struct MediaPart<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

impl<'a> MediaPart<'a> {
    /// A single webcam frame, named the way the service expects.
    pub fn webcam_jpeg(bytes: &'a [u8]) -> Self {
        Self {
            file_name: "webcam.jpg",
            content_type: "image/jpeg",
            bytes,
        }
    }
}

/// Reply of a detect call: annotated media plus the parsed manifest.
#[derive(Clone, Debug, Default)]
pub struct DetectResponse {
    pub media: Vec<u8>,
    pub manifest: DetectionManifest,
    /// Base64 representative frame (video uploads only).
    pub detection_image: Option<String>,
}

/// Acknowledgement body of `/api/send_notification`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NotificationAck(pub serde_json::Value);

/// Remote detection service.
///
/// Every call is a single blocking round trip. Callers own pacing; an
/// implementation must not retry on its own.
pub trait DetectEndpoint: Send + Sync {
    /// Endpoint identifier for logs.
    fn name(&self) -> &str;

    /// `POST /api/detect_webcam` with one encoded frame.
    fn detect_frame(&self, frame: MediaPart<'_>, confidence: f32) -> Result<DetectResponse>;

    /// `POST /api/detect` with an uploaded image or video.
    fn detect_upload(&self, media: MediaPart<'_>, confidence: f32) -> Result<DetectResponse>;

    /// `POST /api/send_notification`.
    fn send_notification(&self, request: &NotificationRequest) -> Result<NotificationAck>;
}
