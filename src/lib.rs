//! Sharp Sentinel
//!
//! Client for a remote sharp-object detection service. Inference runs entirely
//! server-side; this crate captures frames, submits them, renders the annotated
//! results and decides when a detection is worth an alert.
//!
//! # Architecture
//!
//! The live path is a single owned session with an explicit lifecycle:
//!
//! 1. **Acquire**: `LiveSession::start` opens the camera and binds the stream to a
//!    `CaptureSession`. Acquisition failures leave the session Idle.
//! 2. **Cycle**: a `DetectionLoop` grabs a frame, encodes it as JPEG, submits it,
//!    renders the annotated reply and updates the seen-object set and gallery.
//! 3. **Pace**: the next cycle is scheduled only after the current one finishes,
//!    so at most one detect request is ever in flight.
//! 4. **Notify**: novel detections are handed to a `NotificationDispatcher`
//!    thread so a slow notification service never delays the next cycle.
//! 5. **Release**: `LiveSession::stop` (or a lost stream) stops every track.
//!
//! # Module Structure
//!
//! - `capture`: camera back-ends and media stream handles
//! - `frame`: captured rasters and annotated replies (JPEG encode/decode)
//! - `detect`: detection manifest and the remote endpoint client
//! - `alert`: novelty tracking and alert state
//! - `notify`: SMS/email notification requests and their dispatch worker
//! - `gallery`: bounded history of novel detections
//! - `render`: where annotated frames are presented
//! - `live` / `session`: the detection loop and its controller
//! - `upload`: single image/video detection

pub mod alert;
pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod gallery;
pub mod live;
pub mod notify;
pub mod render;
pub mod session;
pub mod upload;

pub use alert::{AlertState, SeenObjects, Verdict};
pub use capture::{open_camera, AcquireError, Camera, MediaStream, VideoConstraints};
pub use config::SentinelConfig;
pub use detect::{
    DetectEndpoint, DetectResponse, Detection, DetectionId, DetectionKey, DetectionManifest,
    HttpEndpoint, MediaPart, NotificationAck,
};
pub use frame::{AnnotatedFrame, Frame};
pub use gallery::{Gallery, GalleryEntry, DEFAULT_GALLERY_CAPACITY};
pub use live::{
    CycleOutcome, CycleReport, DetectionLoop, LiveStatus, LoopSettings, LoopStats, Pacing,
    StopSignal,
};
pub use notify::{
    DetectionMode, DispatchStats, NotificationChannel, NotificationDispatcher, NotificationRequest,
    Notifier,
};
pub use render::{NullSink, PreviewFile, RenderSink};
pub use session::{
    CaptureSession, LiveSession, SessionError, SessionSettings, SessionState, SessionSummary,
};
pub use upload::{MediaKind, UploadError, UploadOutcome, UploadRequest, DEFAULT_UPLOAD_LIMIT_BYTES};
