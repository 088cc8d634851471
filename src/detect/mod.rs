mod endpoint;
mod http;
pub mod manifest;
mod multipart;

pub use endpoint::{DetectEndpoint, DetectResponse, MediaPart, NotificationAck};
pub use http::HttpEndpoint;
pub use manifest::{
    parse_detection_image, parse_manifest, BoundingBox, Detection, DetectionId, DetectionKey,
    DetectionManifest, DETECTIONS_HEADER, DETECTION_IMAGE_HEADER,
};
