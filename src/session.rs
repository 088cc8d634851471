//! Capture session lifecycle.
//!
//! - `CaptureSession`: exclusive owner of one media stream plus the shared
//!   active flag. Releasing it stops every track; dropping it releases too.
//! - `LiveSession`: controller with states {Idle, Active}. `start` acquires the
//!   camera and spawns the detection loop on a worker thread; `stop` signals
//!   the loop, waits for its in-flight cycle, and takes back the gallery.
//!
//! Idle → Active only through a successful `start`. Active → Idle through
//! `stop`, the cycle limit, or a lost stream.

use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::capture::{AcquireError, Camera, MediaStream, VideoConstraints};
use crate::config::SentinelConfig;
use crate::detect::DetectEndpoint;
use crate::frame::Frame;
use crate::gallery::Gallery;
use crate::live::{
    CycleReport, DetectionLoop, LiveStatus, LoopExit, LoopParts, LoopSettings, LoopStats,
    StopSignal,
};
use crate::notify::{NotificationChannel, NotificationDispatcher, Notifier};
use crate::render::{NullSink, RenderSink};

// ----------------------------------------------------------------------------
// CaptureSession: exclusive stream owner
// ----------------------------------------------------------------------------

pub struct CaptureSession {
    stream: Option<Box<dyn MediaStream>>,
    label: String,
    stop: StopSignal,
    video_size: Option<(u32, u32)>,
}

impl CaptureSession {
    /// Bind an acquired stream. The session starts active.
    pub fn bind(stream: Box<dyn MediaStream>) -> Self {
        Self {
            label: stream.label().to_string(),
            stream: Some(stream),
            stop: StopSignal::active(),
            video_size: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_active(&self) -> bool {
        self.stop.is_active() && self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    /// Native size of the most recent frame.
    pub fn video_size(&self) -> Option<(u32, u32)> {
        self.video_size
    }

    /// Grab the current frame, re-syncing the video size from it.
    pub fn grab(&mut self) -> Result<Option<Frame>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("capture session {} already released", self.label))?;
        let frame = stream.grab()?;
        if let Some(frame) = &frame {
            let size = (frame.width(), frame.height());
            if self.video_size != Some(size) {
                log::debug!("{} video size now {}x{}", self.label, size.0, size.1);
                self.video_size = Some(size);
            }
        }
        Ok(frame)
    }

    /// Stop every track, unbind the stream and mark the session inactive. Idempotent.
    pub fn release(&mut self) {
        self.stop.stop();
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
        }
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// LiveSession: start/stop controller
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

#[derive(Debug)]
pub enum SessionError {
    AlreadyActive,
    Acquire(AcquireError),
    /// The gallery could not be rebuilt after a lost loop.
    GalleryUnavailable(anyhow::Error),
    Spawn(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyActive => f.write_str("capture session is already active"),
            SessionError::Acquire(err) => write!(f, "{}", err),
            SessionError::GalleryUnavailable(err) => write!(f, "gallery unavailable: {:#}", err),
            SessionError::Spawn(err) => write!(f, "failed to start detection loop: {}", err),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Acquire(err) => Some(err),
            SessionError::Spawn(err) => Some(err),
            SessionError::GalleryUnavailable(err) => Some(err.as_ref()),
            SessionError::AlreadyActive => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub constraints: VideoConstraints,
    pub loop_settings: LoopSettings,
    pub notification: NotificationChannel,
    pub gallery_capacity: usize,
}

impl SessionSettings {
    pub fn from_config(cfg: &SentinelConfig) -> Self {
        Self {
            constraints: VideoConstraints {
                ideal_width: cfg.camera.width,
                ideal_height: cfg.camera.height,
            },
            loop_settings: LoopSettings {
                confidence: cfg.confidence,
                jpeg_quality: cfg.pacing.jpeg_quality,
                backoff: cfg.pacing.backoff,
                pacing: cfg.pacing.pacing,
                max_cycles: None,
            },
            notification: cfg.notification.channel(),
            gallery_capacity: cfg.gallery_capacity,
        }
    }
}

struct Worker {
    stop: StopSignal,
    handle: JoinHandle<LoopParts>,
}

/// Summary of one finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub exit: LoopExit,
    pub stats: LoopStats,
}

pub struct LiveSession {
    camera: Box<dyn Camera>,
    endpoint: Arc<dyn DetectEndpoint>,
    settings: SessionSettings,
    gallery: Option<Gallery>,
    sink: Option<Box<dyn RenderSink>>,
    worker: Option<Worker>,
    status: LiveStatus,
    last_summary: Option<SessionSummary>,
}

impl LiveSession {
    pub fn new(
        camera: Box<dyn Camera>,
        endpoint: Arc<dyn DetectEndpoint>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let gallery = Gallery::new(settings.gallery_capacity)?;
        Ok(Self {
            camera,
            endpoint,
            settings,
            gallery: Some(gallery),
            sink: Some(Box::new(NullSink::new())),
            worker: None,
            status: LiveStatus::new(),
            last_summary: None,
        })
    }

    /// Replace the render sink. Takes effect on the next `start`.
    pub fn with_sink(mut self, sink: Box<dyn RenderSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Current state. Reaps a loop that ended on its own.
    pub fn state(&mut self) -> SessionState {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.handle.is_finished());
        if finished {
            self.join_worker();
        }
        if self.worker.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    /// Acquire the camera and start the detection loop.
    ///
    /// On failure the session stays Idle and nothing is submitted.
    pub fn start(&mut self) -> std::result::Result<(), SessionError> {
        if self.state() == SessionState::Active {
            return Err(SessionError::AlreadyActive);
        }
        let gallery = match self.gallery.take() {
            Some(gallery) => gallery,
            None => Gallery::new(self.settings.gallery_capacity)
                .map_err(SessionError::GalleryUnavailable)?,
        };

        let stream = match self.camera.acquire(&self.settings.constraints) {
            Ok(stream) => stream,
            Err(err) => {
                log::error!("{}", err.user_message());
                self.gallery = Some(gallery);
                return Err(SessionError::Acquire(err));
            }
        };
        let capture = CaptureSession::bind(stream);
        let stop = capture.stop_signal();

        let notifier = Notifier::new(self.settings.notification.clone(), self.endpoint.clone());
        let notifications = match NotificationDispatcher::spawn(notifier) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                self.gallery = Some(gallery);
                return Err(SessionError::Spawn(err));
            }
        };
        let sink = self
            .sink
            .take()
            .unwrap_or_else(|| Box::new(NullSink::new()));
        let detection_loop = DetectionLoop::new(
            capture,
            self.endpoint.clone(),
            notifications,
            sink,
            gallery,
            self.settings.loop_settings.clone(),
            self.status.clone(),
        );

        let handle = std::thread::Builder::new()
            .name("detection-loop".to_string())
            .spawn(move || detection_loop.run())
            .map_err(SessionError::Spawn)?;

        log::info!("capture session started on {}", self.camera.device());
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Stop the loop and release the camera. No-op when Idle.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        let worker = self.worker.as_ref()?;
        worker.stop.stop();
        self.join_worker()
    }

    /// Block until the loop ends on its own (cycle limit, lost stream, or an
    /// external `StopSignal::stop`).
    pub fn wait(&mut self) -> Option<SessionSummary> {
        self.worker.as_ref()?;
        self.join_worker()
    }

    /// Stop flag of the running session, for signal handlers.
    pub fn stop_signal(&self) -> Option<StopSignal> {
        self.worker.as_ref().map(|worker| worker.stop.clone())
    }

    /// Gallery of novel detections. Unavailable while the loop owns it.
    pub fn gallery(&self) -> Option<&Gallery> {
        self.gallery.as_ref()
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Report of the most recent completed cycle, also while Active.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.status.last_report()
    }

    /// Shared handle on the latest cycle report, for observers on other threads.
    pub fn status(&self) -> LiveStatus {
        self.status.clone()
    }

    fn join_worker(&mut self) -> Option<SessionSummary> {
        let worker = self.worker.take()?;
        match worker.handle.join() {
            Ok(parts) => {
                self.gallery = Some(parts.gallery);
                self.sink = Some(parts.sink);
                let summary = SessionSummary {
                    exit: parts.exit,
                    stats: parts.stats,
                };
                log::info!("capture session stopped ({:?})", summary.exit);
                self.last_summary = Some(summary.clone());
                Some(summary)
            }
            Err(_) => {
                // Capture and dispatcher were released while unwinding.
                log::error!("detection loop panicked; gallery and sink were lost");
                self.gallery = Gallery::new(self.settings.gallery_capacity).ok();
                self.sink = Some(Box::new(NullSink::new()));
                None
            }
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}
