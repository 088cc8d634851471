//! Synthetic camera (`stub://`).
//!
//! Generates patterned RGB frames at the requested size. A few reserved device
//! names simulate acquisition failures:
//! - `stub://denied`: permission denied
//! - `stub://absent`: no such device
//! - `stub://busy`: device held by another process
//!
//! `with_fail_after` makes streams die mid-session, as an unplugged camera does.
//!
//! Open streams are counted so tests can verify that every acquired stream is
//! released.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{AcquireError, Camera, MediaStream, VideoConstraints};
use crate::frame::Frame;

pub struct SyntheticCamera {
    device: String,
    open_streams: Arc<AtomicUsize>,
    warmup_frames: u32,
    fail_after: Option<u64>,
}

impl SyntheticCamera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            open_streams: Arc::new(AtomicUsize::new(0)),
            warmup_frames: 0,
            fail_after: None,
        }
    }

    /// Streams report "not ready" for the first `frames` grabs.
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Streams fail every grab once `frames` frames have been produced.
    pub fn with_fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Shared count of streams acquired and not yet stopped.
    pub fn open_streams(&self) -> Arc<AtomicUsize> {
        self.open_streams.clone()
    }
}

impl Camera for SyntheticCamera {
    fn device(&self) -> &str {
        &self.device
    }

    fn acquire(
        &mut self,
        constraints: &VideoConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, AcquireError> {
        match self.device.as_str() {
            "stub://denied" => return Err(AcquireError::PermissionDenied(self.device.clone())),
            "stub://absent" => return Err(AcquireError::DeviceNotFound(self.device.clone())),
            "stub://busy" => return Err(AcquireError::DeviceBusy(self.device.clone())),
            _ => {}
        }
        if constraints.ideal_width == 0 || constraints.ideal_height == 0 {
            return Err(AcquireError::Other(anyhow!(
                "requested {}x{} is not a valid frame size",
                constraints.ideal_width,
                constraints.ideal_height
            )));
        }
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "SyntheticCamera: {} streaming {}x{}",
            self.device,
            constraints.ideal_width,
            constraints.ideal_height
        );
        Ok(Box::new(SyntheticStream {
            label: self.device.clone(),
            width: constraints.ideal_width,
            height: constraints.ideal_height,
            frame_count: 0,
            scene_state: 0,
            warmup_remaining: self.warmup_frames,
            fail_after: self.fail_after,
            live: true,
            open_streams: self.open_streams.clone(),
        }))
    }
}

struct SyntheticStream {
    label: String,
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u8,
    warmup_remaining: u32,
    fail_after: Option<u64>,
    live: bool,
    open_streams: Arc<AtomicUsize>,
}

impl SyntheticStream {
    /// Mostly static background, with the scene shifting every 50 frames.
    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl MediaStream for SyntheticStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        if !self.live {
            return Err(anyhow!("stream {} has been stopped", self.label));
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(None);
        }
        if self.fail_after.is_some_and(|limit| self.frame_count >= limit) {
            return Err(anyhow!(
                "stream {} lost after {} frames",
                self.label,
                self.frame_count
            ));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::from_rgb(pixels, self.width, self.height).map(Some)
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
            log::info!("SyntheticCamera: {} tracks stopped", self.label);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
