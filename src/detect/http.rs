//! HTTP client for the detection service.
//!
//! `HttpEndpoint` talks to the three service routes over blocking `ureq` calls:
//! - `/api/detect` (image/video upload)
//! - `/api/detect_webcam` (single JPEG frame)
//! - `/api/send_notification` (JSON)
//!
//! Non-2xx replies, missing manifests and oversized bodies are errors. Retries
//! and backoff belong to the caller.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::endpoint::{DetectEndpoint, DetectResponse, MediaPart, NotificationAck};
use super::manifest::{parse_detection_image, parse_manifest, DETECTIONS_HEADER, DETECTION_IMAGE_HEADER};
use super::multipart::MultipartForm;
use crate::notify::NotificationRequest;

/// Upper bound on a reply body (annotated videos can be large).
const MAX_RESPONSE_BYTES: u64 = 512 * 1024 * 1024;
const MAX_ERROR_BODY_BYTES: u64 = 4 * 1024;

pub const DETECT_PATH: &str = "api/detect";
pub const DETECT_WEBCAM_PATH: &str = "api/detect_webcam";
pub const NOTIFICATION_PATH: &str = "api/send_notification";

pub struct HttpEndpoint {
    agent: ureq::Agent,
    base: Url,
    detect_url: Url,
    detect_webcam_url: Url,
    notification_url: Url,
}

impl HttpEndpoint {
    /// Build a client for the service rooted at `base_url` (e.g. `http://127.0.0.1:5000`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).context("parse detection endpoint url")?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported endpoint scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            detect_url: base.join(DETECT_PATH).context("build detect url")?,
            detect_webcam_url: base.join(DETECT_WEBCAM_PATH).context("build webcam url")?,
            notification_url: base.join(NOTIFICATION_PATH).context("build notification url")?,
            agent,
            base,
        })
    }

    fn post_media(&self, url: &Url, media: MediaPart<'_>, confidence: f32) -> Result<DetectResponse> {
        let (content_type, body) = MultipartForm::new()
            .file("file", media.file_name, media.content_type, media.bytes)
            .text("confidence", &format_confidence(confidence))
            .finish();

        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .map_err(|e| request_error(url, e))?;

        let manifest = parse_manifest(response.header(DETECTIONS_HEADER))?;
        let detection_image = parse_detection_image(response.header(DETECTION_IMAGE_HEADER))?;

        let mut media = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES + 1)
            .read_to_end(&mut media)
            .with_context(|| format!("read reply body from {}", url))?;
        if media.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(anyhow!(
                "reply from {} exceeded {} bytes",
                url,
                MAX_RESPONSE_BYTES
            ));
        }
        if media.is_empty() {
            return Err(anyhow!("empty reply body from {}", url));
        }

        Ok(DetectResponse {
            media,
            manifest,
            detection_image,
        })
    }
}

impl DetectEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    fn detect_frame(&self, frame: MediaPart<'_>, confidence: f32) -> Result<DetectResponse> {
        self.post_media(&self.detect_webcam_url, frame, confidence)
    }

    fn detect_upload(&self, media: MediaPart<'_>, confidence: f32) -> Result<DetectResponse> {
        self.post_media(&self.detect_url, media, confidence)
    }

    fn send_notification(&self, request: &NotificationRequest) -> Result<NotificationAck> {
        let body = serde_json::to_vec(request).context("serialize notification request")?;
        let response = self
            .agent
            .post(self.notification_url.as_str())
            .set("Content-Type", "application/json")
            .send_bytes(&body)
            .map_err(|e| request_error(&self.notification_url, e))?;
        let ack: serde_json::Value = serde_json::from_reader(response.into_reader())
            .map_err(|e| anyhow!("invalid notification acknowledgement: {}", e))?;
        Ok(NotificationAck(ack))
    }
}

fn request_error(url: &Url, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let mut detail = String::new();
            let _ = response
                .into_reader()
                .take(MAX_ERROR_BODY_BYTES)
                .read_to_string(&mut detail);
            anyhow!("{} returned HTTP {}: {}", url, code, detail.trim())
        }
        other => anyhow::Error::new(other).context(format!("request to {} failed", url)),
    }
}

fn format_confidence(confidence: f32) -> String {
    let text = format!("{:.4}", confidence);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}
