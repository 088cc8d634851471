use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::capture::{DEFAULT_IDEAL_HEIGHT, DEFAULT_IDEAL_WIDTH};
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::gallery::DEFAULT_GALLERY_CAPACITY;
use crate::live::{Pacing, DEFAULT_BACKOFF, DEFAULT_CONFIDENCE, DEFAULT_FIXED_INTERVAL, DEFAULT_TICK};
use crate::notify::{normalize_sms_number, NotificationChannel, DEFAULT_SMS_PREFIX};
use crate::upload::DEFAULT_UPLOAD_LIMIT_BYTES;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000";
const DEFAULT_CAMERA: &str = "/dev/video0";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    confidence: Option<f32>,
    camera: Option<CameraConfigFile>,
    pacing: Option<PacingConfigFile>,
    notification: Option<NotificationConfigFile>,
    gallery_capacity: Option<usize>,
    upload_limit_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PacingConfigFile {
    mode: Option<String>,
    tick_ms: Option<u64>,
    period_ms: Option<u64>,
    backoff_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct NotificationConfigFile {
    channel: Option<String>,
    sms_number: Option<String>,
    email: Option<String>,
    sms_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// Base URL of the detection service.
    pub endpoint: String,
    pub timeout: Duration,
    pub confidence: f32,
    pub camera: CameraSettings,
    pub pacing: PacingSettings,
    pub notification: NotificationSettings,
    pub gallery_capacity: usize,
    pub upload_limit_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct PacingSettings {
    pub pacing: Pacing,
    pub backoff: Duration,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// `none`, `sms` or `email`.
    pub kind: String,
    pub sms_number: Option<String>,
    pub email: Option<String>,
    pub sms_prefix: String,
}

impl NotificationSettings {
    /// Channel for the configured kind. Validation guarantees the destination exists.
    pub fn channel(&self) -> NotificationChannel {
        match self.kind.as_str() {
            "sms" => match &self.sms_number {
                Some(number) => NotificationChannel::Sms {
                    number: normalize_sms_number(number, &self.sms_prefix),
                },
                None => NotificationChannel::None,
            },
            "email" => match &self.email {
                Some(address) => NotificationChannel::Email {
                    address: address.clone(),
                },
                None => NotificationChannel::None,
            },
            _ => NotificationChannel::None,
        }
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            confidence: DEFAULT_CONFIDENCE,
            camera: CameraSettings {
                device: DEFAULT_CAMERA.to_string(),
                width: DEFAULT_IDEAL_WIDTH,
                height: DEFAULT_IDEAL_HEIGHT,
            },
            pacing: PacingSettings {
                pacing: Pacing::default(),
                backoff: DEFAULT_BACKOFF,
                jpeg_quality: DEFAULT_JPEG_QUALITY,
            },
            notification: NotificationSettings {
                kind: "none".to_string(),
                sms_number: None,
                email: None,
                sms_prefix: DEFAULT_SMS_PREFIX.to_string(),
            },
            gallery_capacity: DEFAULT_GALLERY_CAPACITY,
            upload_limit_bytes: DEFAULT_UPLOAD_LIMIT_BYTES,
        }
    }
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG` (if set), then environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let camera = file.camera.unwrap_or_default();
        let pacing_file = file.pacing.unwrap_or_default();
        let notification = file.notification.unwrap_or_default();

        let pacing = match pacing_file.mode.as_deref() {
            None => defaults.pacing.pacing,
            Some(mode) => parse_pacing(mode, pacing_file.tick_ms, pacing_file.period_ms)?,
        };

        Ok(Self {
            endpoint: file.endpoint.unwrap_or(defaults.endpoint),
            timeout: file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            confidence: file.confidence.unwrap_or(defaults.confidence),
            camera: CameraSettings {
                device: camera.device.unwrap_or(defaults.camera.device),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
            },
            pacing: PacingSettings {
                pacing,
                backoff: pacing_file
                    .backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.pacing.backoff),
                jpeg_quality: pacing_file
                    .jpeg_quality
                    .unwrap_or(defaults.pacing.jpeg_quality),
            },
            notification: NotificationSettings {
                kind: notification
                    .channel
                    .map(|kind| kind.trim().to_lowercase())
                    .unwrap_or(defaults.notification.kind),
                sms_number: notification.sms_number.as_deref().and_then(non_empty),
                email: notification.email.as_deref().and_then(non_empty),
                sms_prefix: notification
                    .sms_prefix
                    .unwrap_or(defaults.notification.sms_prefix),
            },
            gallery_capacity: file.gallery_capacity.unwrap_or(defaults.gallery_capacity),
            upload_limit_bytes: file
                .upload_limit_bytes
                .unwrap_or(defaults.upload_limit_bytes),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(endpoint) = std::env::var("SENTINEL_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_string();
            }
        }
        if let Ok(confidence) = std::env::var("SENTINEL_CONFIDENCE") {
            self.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(camera) = std::env::var("SENTINEL_CAMERA") {
            if !camera.trim().is_empty() {
                self.camera.device = camera.trim().to_string();
            }
        }
        if let Ok(kind) = std::env::var("SENTINEL_NOTIFY") {
            if !kind.trim().is_empty() {
                self.notification.kind = kind.trim().to_lowercase();
            }
        }
        if let Ok(number) = std::env::var("SENTINEL_SMS_NUMBER") {
            if !number.trim().is_empty() {
                self.notification.sms_number = Some(number.trim().to_string());
            }
        }
        if let Ok(email) = std::env::var("SENTINEL_EMAIL") {
            if !email.trim().is_empty() {
                self.notification.email = Some(email.trim().to_string());
            }
        }
        if let Ok(backoff) = std::env::var("SENTINEL_BACKOFF_MS") {
            let millis: u64 = backoff.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_BACKOFF_MS must be an integer number of milliseconds")
            })?;
            self.pacing.backoff = Duration::from_millis(millis);
        }
        if let Ok(capacity) = std::env::var("SENTINEL_GALLERY_CAPACITY") {
            self.gallery_capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_GALLERY_CAPACITY must be a positive integer"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence must be between 0 and 1 (got {})",
                self.confidence
            ));
        }
        if !(1..=100).contains(&self.pacing.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.gallery_capacity == 0 {
            return Err(anyhow!("gallery_capacity must be at least 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("timeout must be greater than zero"));
        }
        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| anyhow!("invalid endpoint {}: {}", self.endpoint, e))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!("endpoint must use http or https"));
        }
        match self.notification.kind.as_str() {
            "none" => {}
            "sms" => {
                let number = self.notification.sms_number.as_deref().unwrap_or("");
                if number.trim().is_empty() {
                    return Err(anyhow!("sms notifications require an sms_number"));
                }
            }
            "email" => match self.notification.email.as_deref().and_then(non_empty) {
                Some(address) if address.contains('@') => {}
                Some(address) => {
                    return Err(anyhow!("invalid notification email address {}", address))
                }
                None => return Err(anyhow!("email notifications require an email address")),
            },
            other => {
                return Err(anyhow!(
                    "unknown notification channel {} (expected none, sms or email)",
                    other
                ))
            }
        }
        Ok(())
    }
}

fn parse_pacing(mode: &str, tick_ms: Option<u64>, period_ms: Option<u64>) -> Result<Pacing> {
    match mode.trim().to_lowercase().as_str() {
        "backpressured" => Ok(Pacing::Backpressured {
            tick: tick_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TICK),
        }),
        "fixed" | "fixed_interval" => Ok(Pacing::FixedInterval {
            period: period_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_FIXED_INTERVAL),
        }),
        other => Err(anyhow!(
            "unknown pacing mode {} (expected backpressured or fixed)",
            other
        )),
    }
}

/// Trimmed value, or `None` when only whitespace is left.
fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
