//! Bounded history of novel detections.
//!
//! Entries are pushed at the front and evicted from the back once the buffer
//! exceeds its capacity. Only cycles that contributed a newly-seen identifier
//! are recorded; repeated sightings never enter the gallery.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::detect::DetectionKey;

pub const DEFAULT_GALLERY_CAPACITY: usize = 10;

/// Annotated snapshot of a cycle that produced new detections.
#[derive(Clone, Debug)]
pub struct GalleryEntry {
    pub jpeg: Vec<u8>,
    pub captured_at: SystemTime,
    pub new_keys: Vec<DetectionKey>,
}

impl GalleryEntry {
    pub fn new(jpeg: Vec<u8>, new_keys: Vec<DetectionKey>) -> Self {
        Self {
            jpeg,
            captured_at: SystemTime::now(),
            new_keys,
        }
    }

    fn epoch_millis(&self) -> u128 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }
}

/// Most-recent-first ring buffer of gallery entries.
#[derive(Debug)]
pub struct Gallery {
    entries: VecDeque<GalleryEntry>,
    capacity: usize,
}

impl Gallery {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("gallery capacity must be greater than zero"));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        })
    }

    /// Insert at the front. Returns the evicted oldest entry, if any.
    pub fn push(&mut self, entry: GalleryEntry) -> Option<GalleryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<&GalleryEntry> {
        self.entries.front()
    }

    /// Entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn memory_bytes(&self) -> usize {
        self.entries.iter().map(|entry| entry.jpeg.len()).sum()
    }

    /// Write every entry as `detection_<rank>_<epoch_ms>.jpg`, rank 00 being the newest.
    pub fn export_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create gallery dir {}", dir.display()))?;
        let mut written = Vec::with_capacity(self.entries.len());
        for (rank, entry) in self.entries.iter().enumerate() {
            let path = dir.join(format!(
                "detection_{:02}_{}.jpg",
                rank,
                entry.epoch_millis()
            ));
            std::fs::write(&path, &entry.jpeg)
                .with_context(|| format!("write gallery entry {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionId;

    fn entry(tag: u8) -> GalleryEntry {
        GalleryEntry::new(
            vec![tag],
            vec![DetectionKey::Id(DetectionId::from(tag as u64))],
        )
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut gallery = Gallery::new(DEFAULT_GALLERY_CAPACITY).unwrap();
        for tag in 0..25 {
            gallery.push(entry(tag));
            assert!(gallery.len() <= DEFAULT_GALLERY_CAPACITY);
        }
        assert_eq!(gallery.len(), DEFAULT_GALLERY_CAPACITY);
    }

    #[test]
    fn eleventh_insert_evicts_exactly_the_oldest() {
        let mut gallery = Gallery::new(10).unwrap();
        for tag in 0..10 {
            assert!(gallery.push(entry(tag)).is_none());
        }
        let evicted = gallery.push(entry(10)).expect("oldest evicted");
        assert_eq!(evicted.jpeg, vec![0]);
        assert_eq!(gallery.len(), 10);

        let order: Vec<u8> = gallery.iter().map(|e| e.jpeg[0]).collect();
        assert_eq!(order, (1..=10).rev().collect::<Vec<u8>>());
        assert_eq!(gallery.latest().unwrap().jpeg, vec![10]);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(Gallery::new(0).is_err());
    }

    #[test]
    fn exports_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::new(3).unwrap();
        gallery.push(entry(1));
        gallery.push(entry(2));

        let written = gallery.export_to_dir(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("detection_00_"));
        assert_eq!(std::fs::read(&written[0]).unwrap(), vec![2]);
        assert_eq!(std::fs::read(&written[1]).unwrap(), vec![1]);
    }
}
