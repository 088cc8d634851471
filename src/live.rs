//! Live detection loop.
//!
//! One cycle is: grab frame → encode JPEG → submit → decode reply → render →
//! update seen set, alert, gallery and notifications. The next cycle is
//! scheduled only once the current one has completed (or its failure backoff
//! has elapsed), so at most one detect request is ever outstanding.
//!
//! Stopping is cooperative: `StopSignal::stop` wakes any pacing or backoff
//! wait, and a cycle whose reply arrives after the stop finishes its own work
//! but never schedules another.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::alert::{AlertState, SeenObjects};
use crate::detect::{DetectEndpoint, MediaPart};
use crate::frame::{AnnotatedFrame, DEFAULT_JPEG_QUALITY};
use crate::gallery::{Gallery, GalleryEntry};
use crate::notify::{encode_image, DetectionMode, NotificationDispatcher};
use crate::render::RenderSink;
use crate::session::CaptureSession;

pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);
/// One display refresh at 60 Hz.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);
pub const DEFAULT_FIXED_INTERVAL: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// StopSignal: shared active flag
// ----------------------------------------------------------------------------

/// Shared "session is active" flag with interruptible waits.
#[derive(Clone, Debug)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// A signal in the active state.
    pub fn active() -> Self {
        Self {
            inner: Arc::new((Mutex::new(true), Condvar::new())),
        }
    }

    pub fn is_active(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|active| *active).unwrap_or(false)
    }

    /// Mark inactive and wake every waiter. Idempotent.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut active) = lock.lock() {
            *active = false;
        }
        cvar.notify_all();
    }

    /// Sleep up to `timeout`, returning early on stop. Returns whether still active.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let Ok(mut active) = lock.lock() else {
            return false;
        };
        let deadline = Instant::now() + timeout;
        while *active {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            active = match cvar.wait_timeout(active, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        *active
    }
}

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

/// How the next cycle is scheduled after a successful one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Next cycle one tick after the previous reply was rendered.
    Backpressured { tick: Duration },
    /// Cycles start on a fixed period; an overrunning cycle skips the missed ticks.
    FixedInterval { period: Duration },
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Backpressured { tick: DEFAULT_TICK }
    }
}

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub confidence: f32,
    pub jpeg_quality: u8,
    pub backoff: Duration,
    pub pacing: Pacing,
    /// Stop on its own after this many completed cycles.
    pub max_cycles: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            backoff: DEFAULT_BACKOFF,
            pacing: Pacing::default(),
            max_cycles: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Cycle results
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub alert: AlertState,
    pub detections: usize,
    pub new_detections: usize,
    pub appended_to_gallery: bool,
    /// A notification was handed to the dispatcher; delivery happens off-loop.
    pub notification_queued: bool,
    pub frame_size: (u32, u32),
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Reply rendered and bookkeeping applied.
    Rendered(CycleReport),
    /// Stream had no frame yet; nothing was submitted.
    NotReady,
    /// Recoverable failure; retry after the backoff.
    Failed(anyhow::Error),
    /// Stream is gone; the session cannot continue.
    StreamLost(anyhow::Error),
    /// Session was not active when the cycle began.
    Halted,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub submitted: u64,
    pub failures: u64,
    pub not_ready: u64,
    pub new_detections: u64,
    pub gallery_appends: u64,
    pub notifications_queued: u64,
    /// Delivered notifications. Final once the loop has returned.
    pub notifications: u64,
    pub notification_failures: u64,
    pub notifications_dropped: u64,
}

/// Why the loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    CycleLimit,
    StreamLost(String),
}

/// Latest cycle report, readable while the loop runs on another thread.
#[derive(Clone, Debug, Default)]
pub struct LiveStatus {
    last_report: Arc<Mutex<Option<CycleReport>>>,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, report: &CycleReport) {
        if let Ok(mut slot) = self.last_report.lock() {
            *slot = Some(report.clone());
        }
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().ok().and_then(|slot| slot.clone())
    }

    /// Alert state of the most recent rendered cycle.
    pub fn alert(&self) -> Option<AlertState> {
        self.last_report().map(|report| report.alert)
    }
}

// ----------------------------------------------------------------------------
// DetectionLoop
// ----------------------------------------------------------------------------

pub struct DetectionLoop {
    capture: CaptureSession,
    endpoint: Arc<dyn DetectEndpoint>,
    notifications: NotificationDispatcher,
    sink: Box<dyn RenderSink>,
    gallery: Gallery,
    seen: SeenObjects,
    settings: LoopSettings,
    stats: LoopStats,
    status: LiveStatus,
    last_alert: Option<AlertState>,
}

/// Everything the loop owned, handed back once it returns.
pub struct LoopParts {
    pub exit: LoopExit,
    pub stats: LoopStats,
    pub gallery: Gallery,
    pub sink: Box<dyn RenderSink>,
    pub seen: SeenObjects,
}

impl DetectionLoop {
    pub fn new(
        capture: CaptureSession,
        endpoint: Arc<dyn DetectEndpoint>,
        notifications: NotificationDispatcher,
        sink: Box<dyn RenderSink>,
        gallery: Gallery,
        settings: LoopSettings,
        status: LiveStatus,
    ) -> Self {
        Self {
            capture,
            endpoint,
            notifications,
            sink,
            gallery,
            seen: SeenObjects::new(),
            settings,
            stats: LoopStats::default(),
            status,
            last_alert: None,
        }
    }

    /// Run a single cycle.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        if !self.capture.is_active() {
            return CycleOutcome::Halted;
        }

        let frame = match self.capture.grab() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.not_ready += 1;
                return CycleOutcome::NotReady;
            }
            Err(err) => return CycleOutcome::StreamLost(err),
        };
        let frame_size = (frame.width(), frame.height());

        let jpeg = match frame.encode_jpeg(self.settings.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => return self.fail(err),
        };
        drop(frame);

        self.stats.submitted += 1;
        let response = match self
            .endpoint
            .detect_frame(MediaPart::webcam_jpeg(&jpeg), self.settings.confidence)
        {
            Ok(response) => response,
            Err(err) => return self.fail(err),
        };

        let annotated = match AnnotatedFrame::decode(response.media) {
            Ok(annotated) => annotated,
            Err(err) => return self.fail(err),
        };
        if let Err(err) = self.sink.present(&annotated) {
            return self.fail(err);
        }

        let manifest = response.manifest;
        let verdict = self.seen.evaluate(&manifest);
        self.record_alert(verdict.alert);

        let mut report = CycleReport {
            alert: verdict.alert,
            detections: manifest.detections.len(),
            new_detections: verdict.new_keys.len(),
            appended_to_gallery: false,
            notification_queued: false,
            frame_size,
        };

        if verdict.has_new() {
            let jpeg = annotated.into_jpeg();
            log::warn!(
                "new detection(s) [{}] on {}",
                verdict
                    .new_keys
                    .iter()
                    .map(|key| key.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.capture.label()
            );
            let image_base64 = self
                .notifications
                .is_enabled()
                .then(|| encode_image(&jpeg));
            report.notification_queued = self
                .notifications
                .dispatch(DetectionMode::Webcam, image_base64);
            if self
                .gallery
                .push(GalleryEntry::new(jpeg, verdict.new_keys))
                .is_some()
            {
                log::debug!("gallery full; evicted oldest entry");
            }
            report.appended_to_gallery = true;
            self.stats.new_detections += report.new_detections as u64;
            self.stats.gallery_appends += 1;
            if report.notification_queued {
                self.stats.notifications_queued += 1;
            }
        }

        self.stats.cycles += 1;
        self.status.record(&report);
        CycleOutcome::Rendered(report)
    }

    /// Drive cycles until stopped, the cycle limit is hit, or the stream is lost.
    ///
    /// The capture session is released before returning.
    pub fn run(mut self) -> LoopParts {
        let stop = self.capture.stop_signal();
        let mut next_tick = Instant::now();
        log::info!(
            "detection loop started on {} (endpoint={}, confidence={}, pacing={:?})",
            self.capture.label(),
            self.endpoint.name(),
            self.settings.confidence,
            self.settings.pacing
        );

        let exit = loop {
            let delay = match self.run_cycle() {
                CycleOutcome::Halted => break LoopExit::Stopped,
                CycleOutcome::StreamLost(err) => {
                    log::error!("capture stream lost on {}: {:#}", self.capture.label(), err);
                    break LoopExit::StreamLost(format!("{:#}", err));
                }
                CycleOutcome::Failed(_) => self.settings.backoff,
                CycleOutcome::NotReady | CycleOutcome::Rendered(_) => {
                    next_delay(self.settings.pacing, &mut next_tick, Instant::now())
                }
            };

            if let Some(limit) = self.settings.max_cycles {
                if self.stats.cycles >= limit {
                    break LoopExit::CycleLimit;
                }
            }
            if !stop.wait(delay) {
                break LoopExit::Stopped;
            }
        };

        self.capture.release();
        let dispatch = self.notifications.finish();
        self.stats.notifications = dispatch.sent;
        self.stats.notification_failures = dispatch.failed;
        self.stats.notifications_dropped = dispatch.dropped;
        log::info!(
            "detection loop finished ({:?}): cycles={} submitted={} failures={} new={} notifications={}/{}",
            exit,
            self.stats.cycles,
            self.stats.submitted,
            self.stats.failures,
            self.stats.new_detections,
            self.stats.notifications,
            self.stats.notifications_queued
        );

        LoopParts {
            exit,
            stats: self.stats,
            gallery: self.gallery,
            sink: self.sink,
            seen: self.seen,
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> CycleOutcome {
        self.stats.failures += 1;
        log::warn!(
            "detection cycle failed on {}; retrying in {}ms: {:#}",
            self.capture.label(),
            self.settings.backoff.as_millis(),
            err
        );
        CycleOutcome::Failed(err)
    }

    fn record_alert(&mut self, alert: AlertState) {
        if self.last_alert != Some(alert) {
            match alert {
                AlertState::Detected => log::info!("alert: objects detected"),
                AlertState::NoDetections => log::info!("alert: no detections"),
            }
            self.last_alert = Some(alert);
        }
    }
}

/// Wait before the next cycle. Fixed-interval ticks missed by an overrunning
/// cycle are skipped rather than replayed back to back.
fn next_delay(pacing: Pacing, next_tick: &mut Instant, now: Instant) -> Duration {
    match pacing {
        Pacing::Backpressured { tick } => tick,
        Pacing::FixedInterval { period } => {
            *next_tick += period;
            if *next_tick <= now {
                *next_tick = now + period;
            }
            *next_tick - now
        }
    }
}
