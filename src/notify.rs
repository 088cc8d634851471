//! Notification requests.
//!
//! When a detection alert fires and the user opted into a channel, one JSON
//! request is posted to `/api/send_notification`. Delivery is fire-and-forget:
//! a failed dispatch is logged and never changes alert state or loop behaviour.
//!
//! The live loop never waits on the notification service. It hands requests
//! to a `NotificationDispatcher` worker over a bounded queue; when the queue
//! is full the request is dropped and counted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::detect::DetectEndpoint;

pub const DEFAULT_SMS_PREFIX: &str = "+55";
/// Pending notifications held for the dispatch worker.
pub const NOTIFICATION_QUEUE_DEPTH: usize = 16;

/// Where detection notifications go. Channels are mutually exclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NotificationChannel {
    #[default]
    None,
    Sms {
        number: String,
    },
    Email {
        address: String,
    },
}

impl NotificationChannel {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationChannel::None => "none",
            NotificationChannel::Sms { .. } => "sms",
            NotificationChannel::Email { .. } => "email",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, NotificationChannel::None)
    }
}

/// Prefix a local number with the country code unless it already has one.
pub fn normalize_sms_number(number: &str, prefix: &str) -> String {
    let digits: String = number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '(' && *c != ')')
        .collect();
    if digits.starts_with('+') {
        digits
    } else {
        format!("{}{}", prefix, digits)
    }
}

/// Source of a detection, reported to the notification service as a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionMode {
    Image,
    Video,
    Webcam,
}

impl DetectionMode {
    /// Label understood by the notification templates of the service.
    pub fn label(self) -> &'static str {
        match self {
            DetectionMode::Image => "Imagem",
            DetectionMode::Video => "Vídeo",
            DetectionMode::Webcam => "Webcam",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NotificationRequest {
    pub detection_mode: String,
    pub notification_type: String,
    pub sms_number: Option<String>,
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl NotificationRequest {
    /// Build the request for a channel. Returns `None` when notifications are off.
    pub fn for_channel(
        channel: &NotificationChannel,
        mode: DetectionMode,
        image_base64: Option<String>,
    ) -> Option<Self> {
        let (sms_number, email_address) = match channel {
            NotificationChannel::None => return None,
            NotificationChannel::Sms { number } => (Some(number.clone()), None),
            NotificationChannel::Email { address } => (None, Some(address.clone())),
        };
        Some(Self {
            detection_mode: mode.label().to_string(),
            notification_type: channel.kind().to_string(),
            sms_number,
            email_address,
            image_base64,
        })
    }
}

/// Standard base64 of an encoded image, as the service expects it.
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Dispatches notification requests through the detection endpoint.
#[derive(Clone)]
pub struct Notifier {
    channel: NotificationChannel,
    endpoint: Arc<dyn DetectEndpoint>,
}

impl Notifier {
    pub fn new(channel: NotificationChannel, endpoint: Arc<dyn DetectEndpoint>) -> Self {
        Self { channel, endpoint }
    }

    pub fn channel(&self) -> &NotificationChannel {
        &self.channel
    }

    /// Send one notification. Returns true when the service acknowledged it.
    ///
    /// Failures are logged and swallowed.
    pub fn notify(&self, mode: DetectionMode, image_base64: Option<String>) -> bool {
        let Some(request) = NotificationRequest::for_channel(&self.channel, mode, image_base64)
        else {
            return false;
        };
        match self.endpoint.send_notification(&request) {
            Ok(ack) => {
                log::info!(
                    "{} notification sent (mode={}, ack={})",
                    request.notification_type,
                    request.detection_mode,
                    ack.0
                );
                true
            }
            Err(err) => {
                log::warn!(
                    "{} notification failed (mode={}): {:#}",
                    request.notification_type,
                    request.detection_mode,
                    err
                );
                false
            }
        }
    }
}

// ----------------------------------------------------------------------------
// NotificationDispatcher: background delivery for the live loop
// ----------------------------------------------------------------------------

/// Delivery counters of one dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
    /// Requests discarded because the queue was full.
    pub dropped: u64,
}

struct DispatchJob {
    mode: DetectionMode,
    image_base64: Option<String>,
}

pub struct NotificationDispatcher {
    tx: Option<SyncSender<DispatchJob>>,
    handle: Option<JoinHandle<DispatchStats>>,
    dropped: u64,
}

impl NotificationDispatcher {
    /// Start the delivery worker. No thread is started for a disabled channel.
    pub fn spawn(notifier: Notifier) -> std::io::Result<Self> {
        if !notifier.channel().is_enabled() {
            return Ok(Self {
                tx: None,
                handle: None,
                dropped: 0,
            });
        }
        let (tx, rx) = mpsc::sync_channel::<DispatchJob>(NOTIFICATION_QUEUE_DEPTH);
        let handle = std::thread::Builder::new()
            .name("notification-dispatch".to_string())
            .spawn(move || {
                let mut stats = DispatchStats::default();
                for job in rx {
                    if notifier.notify(job.mode, job.image_base64) {
                        stats.sent += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
                stats
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            dropped: 0,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue one notification without waiting for delivery. Returns whether it was queued.
    pub fn dispatch(&mut self, mode: DetectionMode, image_base64: Option<String>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(DispatchJob { mode, image_base64 }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::warn!("notification queue full; dropping {} notification", mode.label());
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                log::warn!("notification worker is gone; dropping notification");
                false
            }
        }
    }

    /// Deliver everything still queued, then stop the worker.
    pub fn finish(mut self) -> DispatchStats {
        self.tx.take();
        let mut stats = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("notification worker panicked");
                DispatchStats::default()
            }),
            None => DispatchStats::default(),
        };
        stats.dropped += self.dropped;
        stats
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        // Closing the queue lets a detached worker finish on its own.
        self.tx.take();
    }
}
