//! Detection manifest parsing.
//!
//! The service reports what it found in a JSON document carried in the
//! `X-Detections` response header, next to the annotated media in the body:
//! `{ "has_detections": true, "detections": [{ "id": 1, "confidence": 0.91, "box": [..] }] }`
//!
//! Video replies may also carry a representative frame in `X-Detection-Image`:
//! `{ "image": "<base64 jpeg>" }`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer};
use std::fmt;

pub const DETECTIONS_HEADER: &str = "X-Detections";
pub const DETECTION_IMAGE_HEADER: &str = "X-Detection-Image";

/// Result of one remote detect call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DetectionManifest {
    #[serde(default)]
    pub has_detections: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detections: Vec<Detection>,
}

impl DetectionManifest {
    /// True when the service reported anything at all.
    pub fn is_positive(&self) -> bool {
        self.has_detections || !self.detections.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Detection {
    #[serde(default)]
    pub id: Option<DetectionId>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, rename = "box")]
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    /// Key used for novelty tracking. Detections without an id share one key.
    pub fn key(&self) -> DetectionKey {
        match &self.id {
            Some(id) => DetectionKey::Id(id.clone()),
            None => DetectionKey::Anonymous,
        }
    }
}

/// Pixel-space box as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(from = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Object identifier assigned by the service's tracker.
///
/// The service sends either integers or strings; both normalize to text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectionId(String);

impl DetectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DetectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for DetectionId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for DetectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireId::deserialize(deserializer)? {
            WireId::Int(id) => Self(id.to_string()),
            WireId::Float(id) => Self(id.to_string()),
            WireId::Text(id) => Self(id),
        })
    }
}

/// Identity of a detection for deduplication purposes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DetectionKey {
    Id(DetectionId),
    Anonymous,
}

impl fmt::Display for DetectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionKey::Id(id) => write!(f, "{}", id),
            DetectionKey::Anonymous => f.write_str("<anonymous>"),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Detection>, D::Error> {
    Ok(Option::<Vec<Detection>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the manifest header. A missing header is an error, not "no detections".
pub fn parse_manifest(header: Option<&str>) -> Result<DetectionManifest> {
    let raw = header
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| anyhow!("response missing {} header", DETECTIONS_HEADER))?;
    serde_json::from_str(raw).map_err(|e| anyhow!("invalid {} header: {}", DETECTIONS_HEADER, e))
}

#[derive(Deserialize)]
struct DetectionImage {
    image: Option<String>,
}

/// Parse the optional representative-frame header of video replies.
pub fn parse_detection_image(header: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = header.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    if raw == "null" {
        return Ok(None);
    }
    let parsed: DetectionImage = serde_json::from_str(raw)
        .map_err(|e| anyhow!("invalid {} header: {}", DETECTION_IMAGE_HEADER, e))?;
    Ok(parsed.image.filter(|image| !image.is_empty()))
}
