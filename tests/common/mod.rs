//! In-process detection service used by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sharp_sentinel::{
    DetectEndpoint, DetectResponse, Detection, DetectionId, DetectionManifest, Frame, MediaPart,
    NotificationAck, NotificationRequest,
};

/// Scripted reply for one detect call.
pub enum Reply {
    Ids(Vec<String>),
    Fail(&'static str),
}

impl Reply {
    pub fn ids(ids: &[&str]) -> Self {
        Reply::Ids(ids.iter().map(|id| id.to_string()).collect())
    }
}

pub struct FakeEndpoint {
    script: Mutex<VecDeque<Reply>>,
    delay: Duration,
    notification_delay: Duration,
    fail_notifications: bool,
    detection_image: Option<String>,
    annotated: Vec<u8>,
    pub detect_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub entered: AtomicBool,
    pub detect_times: Mutex<Vec<Instant>>,
    pub notifications: Mutex<Vec<NotificationRequest>>,
}

impl FakeEndpoint {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: Duration::ZERO,
            notification_delay: Duration::ZERO,
            fail_notifications: false,
            detection_image: None,
            annotated: annotated_jpeg(),
            detect_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            entered: AtomicBool::new(false),
            detect_times: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every notification takes `delay` before it is acknowledged.
    pub fn with_notification_delay(mut self, delay: Duration) -> Self {
        self.notification_delay = delay;
        self
    }

    pub fn with_failing_notifications(mut self) -> Self {
        self.fail_notifications = true;
        self
    }

    pub fn with_detection_image(mut self, image: &str) -> Self {
        self.detection_image = Some(image.to_string());
        self
    }

    pub fn annotated(&self) -> &[u8] {
        &self.annotated
    }

    pub fn calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    /// Time between consecutive detect calls.
    pub fn detect_gaps(&self) -> Vec<Duration> {
        let times = self.detect_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn sent_notifications(&self) -> Vec<NotificationRequest> {
        self.notifications.lock().unwrap().clone()
    }

    fn reply(&self) -> Result<DetectResponse> {
        let next = self.script.lock().unwrap().pop_front();
        let ids = match next {
            Some(Reply::Fail(reason)) => return Err(anyhow!(reason)),
            Some(Reply::Ids(ids)) => ids,
            None => Vec::new(),
        };
        let detections: Vec<Detection> = ids
            .iter()
            .map(|id| Detection {
                id: Some(DetectionId::from(id.as_str())),
                class: Some("knife".to_string()),
                confidence: 0.9,
                bbox: None,
            })
            .collect();
        Ok(DetectResponse {
            media: self.annotated.clone(),
            manifest: DetectionManifest {
                has_detections: !detections.is_empty(),
                detections,
            },
            detection_image: self.detection_image.clone(),
        })
    }
}

impl DetectEndpoint for FakeEndpoint {
    fn name(&self) -> &str {
        "fake"
    }

    fn detect_frame(&self, frame: MediaPart<'_>, _confidence: f32) -> Result<DetectResponse> {
        assert_eq!(frame.content_type, "image/jpeg");
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.detect_times.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.entered.store(true, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let reply = self.reply();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    fn detect_upload(&self, _media: MediaPart<'_>, _confidence: f32) -> Result<DetectResponse> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.reply()
    }

    fn send_notification(&self, request: &NotificationRequest) -> Result<NotificationAck> {
        if !self.notification_delay.is_zero() {
            std::thread::sleep(self.notification_delay);
        }
        self.notifications.lock().unwrap().push(request.clone());
        if self.fail_notifications {
            return Err(anyhow!("notification service unavailable"));
        }
        Ok(NotificationAck(serde_json::json!({ "status": "sent" })))
    }
}

/// Small valid JPEG standing in for the service's annotated frame.
pub fn annotated_jpeg() -> Vec<u8> {
    let pixels = vec![200u8; 32 * 24 * 3];
    Frame::from_rgb(pixels, 32, 24)
        .and_then(|frame| frame.encode_jpeg(80))
        .expect("encode fixture jpeg")
}
