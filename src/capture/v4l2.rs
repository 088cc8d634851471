//! V4L2 camera.
//!
//! This module provides `V4l2Camera` for capturing from local V4L2 devices
//! (e.g., /dev/video0) in packed RGB.
//!
//! The V4L2 camera is responsible for:
//! - Negotiating the closest supported size to the requested constraints
//! - Mapping open failures to permission / missing / busy errors
//! - Releasing the device (buffers and file handle) when tracks are stopped

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::io;
use std::time::Instant;

use super::{AcquireError, Camera, MediaStream, VideoConstraints};
use crate::frame::Frame;

const EBUSY: i32 = 16;
const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    device: String,
}

impl V4l2Camera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    fn map_io_error(&self, err: io::Error, what: &str) -> AcquireError {
        match err.kind() {
            io::ErrorKind::PermissionDenied => AcquireError::PermissionDenied(self.device.clone()),
            io::ErrorKind::NotFound => AcquireError::DeviceNotFound(self.device.clone()),
            _ if err.raw_os_error() == Some(EBUSY) => AcquireError::DeviceBusy(self.device.clone()),
            _ => AcquireError::Other(
                anyhow::Error::new(err).context(format!("{} {}", what, self.device)),
            ),
        }
    }
}

impl Camera for V4l2Camera {
    fn device(&self) -> &str {
        &self.device
    }

    fn acquire(
        &mut self,
        constraints: &VideoConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, AcquireError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.device)
            .map_err(|err| self.map_io_error(err, "open v4l2 device"))?;
        let mut format = device
            .format()
            .map_err(|err| self.map_io_error(err, "read v4l2 format"))?;
        format.width = constraints.ideal_width;
        format.height = constraints.ideal_height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) if err.raw_os_error() == Some(EBUSY) => {
                return Err(AcquireError::DeviceBusy(self.device.clone()))
            }
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    self.device,
                    err
                );
                device
                    .format()
                    .map_err(|err| self.map_io_error(err, "read v4l2 format after set failure"))?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(AcquireError::Other(anyhow!(
                "device {} does not offer RGB3 capture (got {})",
                self.device,
                format.fourcc
            )));
        }

        let state = DeviceStreamStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Camera: streaming {} ({}x{})",
            self.device,
            format.width,
            format.height
        );
        Ok(Box::new(V4l2Stream {
            label: self.device.clone(),
            width: format.width,
            height: format.height,
            state: Some(state),
            frame_count: 0,
            opened_at: Instant::now(),
        }))
    }
}

#[self_referencing]
struct DeviceStreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct V4l2Stream {
    label: String,
    width: u32,
    height: u32,
    state: Option<DeviceStreamState>,
    frame_count: u64,
    opened_at: Instant,
}

impl MediaStream for V4l2Stream {
    fn label(&self) -> &str {
        &self.label
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("stream {} has been stopped", self.label))?;
        let mut pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .with_context(|| format!("capture v4l2 frame from {}", self.label))?;

        let expected = self.width as usize * self.height as usize * 3;
        if pixels.is_empty() {
            return Ok(None);
        }
        if pixels.len() < expected {
            return Err(anyhow!(
                "short v4l2 frame from {}: {} of {} bytes",
                self.label,
                pixels.len(),
                expected
            ));
        }
        pixels.truncate(expected);
        self.frame_count += 1;
        Frame::from_rgb(pixels, self.width, self.height).map(Some)
    }

    fn stop_tracks(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Camera: {} released after {} frames ({}s)",
                self.label,
                self.frame_count,
                self.opened_at.elapsed().as_secs()
            );
        }
    }

    fn is_live(&self) -> bool {
        self.state.is_some()
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
