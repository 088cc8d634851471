//! Single image/video detection.
//!
//! The file size is checked against the limit before the file is read, so an
//! oversized upload never reaches the service.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::alert::AlertState;
use crate::detect::{DetectEndpoint, DetectResponse, DetectionManifest, MediaPart};
use crate::notify::{encode_image, DetectionMode, Notifier};

pub const DEFAULT_UPLOAD_LIMIT_BYTES: u64 = 70 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
];

const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Kind and content type from the file extension.
    pub fn from_path(path: &Path) -> Option<(Self, &'static str)> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if let Some((_, ct)) = IMAGE_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            return Some((MediaKind::Image, ct));
        }
        VIDEO_EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| (MediaKind::Video, *ct))
    }

    pub fn mode(self) -> DetectionMode {
        match self {
            MediaKind::Image => DetectionMode::Image,
            MediaKind::Video => DetectionMode::Video,
        }
    }

    pub fn default_output_name(self) -> &'static str {
        match self {
            MediaKind::Image => "detected_objects.jpg",
            MediaKind::Video => "detected_video.mp4",
        }
    }
}

#[derive(Debug)]
pub enum UploadError {
    TooLarge { size: u64, limit: u64 },
    UnsupportedMedia(PathBuf),
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::TooLarge { size, limit } => write!(
                f,
                "file is {} bytes, above the {} MB upload limit",
                size,
                limit / (1024 * 1024)
            ),
            UploadError::UnsupportedMedia(path) => write!(
                f,
                "{} is not a supported image or video file",
                path.display()
            ),
            UploadError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A validated file, read into memory and ready to submit.
#[derive(Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub kind: MediaKind,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn from_path(path: &Path, limit: u64) -> std::result::Result<Self, UploadError> {
        let (kind, content_type) =
            MediaKind::from_path(path).ok_or_else(|| UploadError::UnsupportedMedia(path.into()))?;
        let io_err = |source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > limit {
            return Err(UploadError::TooLarge { size, limit });
        }
        let bytes = std::fs::read(path).map_err(io_err)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self {
            file_name,
            kind,
            content_type,
            bytes,
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub kind: MediaKind,
    pub alert: AlertState,
    pub manifest: DetectionManifest,
    pub media: Vec<u8>,
    pub notification_sent: bool,
}

impl UploadOutcome {
    /// Write the annotated media. A directory target gets the default file name.
    pub fn write_media(&self, target: &Path) -> Result<PathBuf> {
        let path = if target.is_dir() {
            target.join(self.kind.default_output_name())
        } else {
            target.to_path_buf()
        };
        std::fs::write(&path, &self.media)
            .with_context(|| format!("write annotated output {}", path.display()))?;
        Ok(path)
    }
}

/// Submit one upload and dispatch a notification when it reports detections.
pub fn detect_upload(
    endpoint: &dyn DetectEndpoint,
    notifier: &Notifier,
    request: &UploadRequest,
    confidence: f32,
) -> Result<UploadOutcome> {
    let media = MediaPart {
        file_name: &request.file_name,
        content_type: request.content_type,
        bytes: &request.bytes,
    };
    let DetectResponse {
        media,
        manifest,
        detection_image,
        ..
    } = endpoint
        .detect_upload(media, confidence)
        .with_context(|| format!("detect {}", request.file_name))?;

    let alert = AlertState::from_manifest(&manifest);
    log::info!(
        "{}: {} detection(s), alert={:?}",
        request.file_name,
        manifest.detections.len(),
        alert
    );

    let mut notification_sent = false;
    if alert.is_detected() && notifier.channel().is_enabled() {
        let image_base64 = match request.kind {
            MediaKind::Image => Some(encode_image(&media)),
            MediaKind::Video => detection_image,
        };
        notification_sent = notifier.notify(request.kind.mode(), image_base64);
    }

    Ok(UploadOutcome {
        kind: request.kind,
        alert,
        manifest,
        media,
        notification_sent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn media_kind_follows_extension() {
        assert_eq!(
            MediaKind::from_path(Path::new("knife.JPG")),
            Some((MediaKind::Image, "image/jpeg"))
        );
        assert_eq!(
            MediaKind::from_path(Path::new("clip.mp4")).map(|(kind, _)| kind),
            Some(MediaKind::Video)
        );
        assert!(MediaKind::from_path(Path::new("notes.txt")).is_none());
        assert!(MediaKind::from_path(Path::new("noext")).is_none());
    }

    #[test]
    fn oversized_file_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jpg");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(80 * 1024 * 1024).unwrap();

        let err = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { limit, .. } if limit == DEFAULT_UPLOAD_LIMIT_BYTES));
        assert!(err.to_string().contains("70 MB"));
    }

    #[test]
    fn reads_small_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"not really a png")
            .unwrap();

        let request = UploadRequest::from_path(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap();
        assert_eq!(request.file_name, "frame.png");
        assert_eq!(request.kind, MediaKind::Image);
        assert_eq!(request.content_type, "image/png");
        assert_eq!(request.size(), 16);
    }

    #[test]
    fn write_media_uses_default_name_for_directories() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = UploadOutcome {
            kind: MediaKind::Video,
            alert: AlertState::NoDetections,
            manifest: DetectionManifest::default(),
            media: vec![1, 2, 3],
            notification_sent: false,
        };
        let path = outcome.write_media(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("detected_video.mp4"));
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }
}
