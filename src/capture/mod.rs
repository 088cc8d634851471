//! Camera acquisition.
//!
//! This module provides the camera back-ends a capture session can bind to:
//! - Synthetic cameras (`stub://...`) for tests and demos
//! - USB/V4L2 devices (feature: camera-v4l2)
//!
//! A `Camera` hands out `MediaStream`s. A stream is owned by exactly one
//! capture session, which must call `stop_tracks` before discarding it so the
//! device lock is released.

use anyhow::{anyhow, Result};
use std::fmt;

use crate::frame::Frame;

pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

pub use synthetic::SyntheticCamera;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

pub const DEFAULT_IDEAL_WIDTH: u32 = 640;
pub const DEFAULT_IDEAL_HEIGHT: u32 = 480;

/// Video-only capture request. Devices may pick the closest supported size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: DEFAULT_IDEAL_WIDTH,
            ideal_height: DEFAULT_IDEAL_HEIGHT,
        }
    }
}

/// Why a camera could not be acquired.
#[derive(Debug)]
pub enum AcquireError {
    PermissionDenied(String),
    DeviceNotFound(String),
    DeviceBusy(String),
    Other(anyhow::Error),
}

impl AcquireError {
    /// Message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            AcquireError::PermissionDenied(device) => format!(
                "camera access denied for {}; check device permissions",
                device
            ),
            AcquireError::DeviceNotFound(device) => format!("no camera found at {}", device),
            AcquireError::DeviceBusy(device) => {
                format!("camera {} is in use by another process", device)
            }
            AcquireError::Other(err) => format!("camera could not be opened: {:#}", err),
        }
    }
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for AcquireError {}

impl From<anyhow::Error> for AcquireError {
    fn from(err: anyhow::Error) -> Self {
        AcquireError::Other(err)
    }
}

/// A capture device that can open media streams.
pub trait Camera: Send {
    /// Device identifier for logs.
    fn device(&self) -> &str;

    /// Open a video-only stream honouring the constraints where possible.
    fn acquire(
        &mut self,
        constraints: &VideoConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, AcquireError>;
}

/// Live stream handle. Owned exclusively by one capture session.
pub trait MediaStream: Send {
    fn label(&self) -> &str;

    /// Current frame, or `None` while the stream has no data ready yet.
    ///
    /// An error means the stream is no longer usable.
    fn grab(&mut self) -> Result<Option<Frame>>;

    /// Stop every track. Idempotent.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;
}

/// Open the camera back-end for a device string.
///
/// `stub://...` selects the synthetic camera; anything else is treated as a
/// V4L2 device path.
pub fn open_camera(device: &str) -> Result<Box<dyn Camera>> {
    if device.trim().is_empty() {
        return Err(anyhow!("camera device must not be empty"));
    }
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(device)));
    }
    if device.contains("://") {
        return Err(anyhow!(
            "unsupported camera '{}'; expected stub:// or a local device path",
            device
        ));
    }
    #[cfg(feature = "camera-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(device)))
    }
    #[cfg(not(feature = "camera-v4l2"))]
    {
        Err(anyhow!(
            "camera device {} requires the camera-v4l2 feature",
            device
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_devices_open_synthetic_cameras() {
        let camera = open_camera("stub://webcam").unwrap();
        assert_eq!(camera.device(), "stub://webcam");
    }

    #[test]
    fn rejects_remote_and_empty_devices() {
        assert!(open_camera("").is_err());
        assert!(open_camera("rtsp://camera/stream").is_err());
    }

    #[test]
    fn acquire_errors_have_user_messages() {
        let err = AcquireError::PermissionDenied("/dev/video0".into());
        assert!(err.to_string().contains("denied"));
        let err = AcquireError::DeviceNotFound("/dev/video9".into());
        assert!(err.to_string().contains("/dev/video9"));
    }
}
