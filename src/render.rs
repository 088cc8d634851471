//! Render sinks for annotated frames.
//!
//! Each successful cycle presents its annotated frame to a sink, replacing
//! whatever was shown before.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::frame::AnnotatedFrame;

pub trait RenderSink: Send {
    fn present(&mut self, frame: &AnnotatedFrame) -> Result<()>;
}

/// Discards frames, keeping only a count.
#[derive(Debug, Default)]
pub struct NullSink {
    presented: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl RenderSink for NullSink {
    fn present(&mut self, _frame: &AnnotatedFrame) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}

/// Keeps the latest annotated frame on disk as a JPEG.
///
/// Writes go to a sibling temp file followed by a rename, so readers never
/// observe a half-written preview.
#[derive(Debug)]
pub struct PreviewFile {
    path: PathBuf,
    staging: PathBuf,
    last_size: Option<(u32, u32)>,
}

impl PreviewFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let staging = path.with_extension("jpg.partial");
        Self {
            path,
            staging,
            last_size: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSink for PreviewFile {
    fn present(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        std::fs::write(&self.staging, frame.jpeg())
            .with_context(|| format!("write preview {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        let size = (frame.width(), frame.height());
        if self.last_size != Some(size) {
            log::debug!("preview {} now {}x{}", self.path.display(), size.0, size.1);
            self.last_size = Some(size);
        }
        Ok(())
    }
}
