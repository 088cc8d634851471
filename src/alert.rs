//! Novelty tracking and alert state.
//!
//! A detection is "new" when its identifier has not been seen during the
//! current capture session. Alert state is recomputed from scratch every
//! cycle and is always exactly one of `Detected` / `NoDetections`.

use std::collections::HashSet;

use crate::detect::{DetectionKey, DetectionManifest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertState {
    Detected,
    NoDetections,
}

impl AlertState {
    /// Alert state for a manifest without novelty tracking (uploads).
    pub fn from_manifest(manifest: &DetectionManifest) -> Self {
        if manifest.is_positive() {
            AlertState::Detected
        } else {
            AlertState::NoDetections
        }
    }

    pub fn is_detected(self) -> bool {
        matches!(self, AlertState::Detected)
    }
}

/// Outcome of evaluating one manifest against the seen set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub alert: AlertState,
    /// Keys first seen in this cycle, in manifest order.
    pub new_keys: Vec<DetectionKey>,
}

impl Verdict {
    pub fn has_new(&self) -> bool {
        !self.new_keys.is_empty()
    }
}

/// Identifiers observed during the current capture session.
///
/// Only grows while the session is active. A fresh set is created on every
/// session start.
#[derive(Debug, Default)]
pub struct SeenObjects {
    keys: HashSet<DetectionKey>,
}

impl SeenObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every detection of the manifest and compute the cycle verdict.
    pub fn evaluate(&mut self, manifest: &DetectionManifest) -> Verdict {
        let mut new_keys = Vec::new();
        for detection in &manifest.detections {
            let key = detection.key();
            if self.keys.insert(key.clone()) {
                new_keys.push(key);
            }
        }
        let alert = if !new_keys.is_empty() || manifest.is_positive() {
            AlertState::Detected
        } else {
            AlertState::NoDetections
        };
        Verdict { alert, new_keys }
    }

    pub fn contains(&self, key: &DetectionKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectionId};

    fn manifest(ids: &[&str]) -> DetectionManifest {
        DetectionManifest {
            has_detections: !ids.is_empty(),
            detections: ids
                .iter()
                .map(|id| Detection {
                    id: Some(DetectionId::from(*id)),
                    confidence: 0.8,
                    ..Detection::default()
                })
                .collect(),
        }
    }

    #[test]
    fn same_id_is_new_only_once() {
        let mut seen = SeenObjects::new();

        let first = seen.evaluate(&manifest(&["a"]));
        assert!(first.has_new());
        assert_eq!(first.alert, AlertState::Detected);

        let second = seen.evaluate(&manifest(&["a"]));
        assert!(!second.has_new());
        assert_eq!(second.alert, AlertState::Detected);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn only_unseen_ids_are_reported() {
        let mut seen = SeenObjects::new();
        seen.evaluate(&manifest(&["a", "b"]));

        let verdict = seen.evaluate(&manifest(&["b", "c", "c"]));
        assert_eq!(verdict.new_keys, vec![DetectionKey::Id("c".into())]);
        assert!(seen.contains(&DetectionKey::Id("a".into())));
    }

    #[test]
    fn empty_manifest_raises_no_detections() {
        let mut seen = SeenObjects::new();
        seen.evaluate(&manifest(&["a"]));

        let verdict = seen.evaluate(&manifest(&[]));
        assert_eq!(verdict.alert, AlertState::NoDetections);
        assert!(!verdict.has_new());
    }

    #[test]
    fn exactly_one_alert_for_any_manifest() {
        let mut seen = SeenObjects::new();
        let cases: [&[&str]; 5] = [&["a"], &[], &["a"], &["b"], &[]];
        for ids in cases {
            let verdict = seen.evaluate(&manifest(ids));
            let detected = verdict.alert == AlertState::Detected;
            let clear = verdict.alert == AlertState::NoDetections;
            assert!(detected ^ clear);
            assert_eq!(detected, !ids.is_empty());
        }
    }

    #[test]
    fn anonymous_detections_alert_once() {
        let mut seen = SeenObjects::new();
        let anonymous = DetectionManifest {
            has_detections: true,
            detections: vec![Detection::default()],
        };
        assert!(seen.evaluate(&anonymous).has_new());
        assert!(!seen.evaluate(&anonymous).has_new());
    }

    #[test]
    fn upload_alert_follows_manifest() {
        assert_eq!(AlertState::from_manifest(&manifest(&["x"])), AlertState::Detected);
        assert_eq!(AlertState::from_manifest(&manifest(&[])), AlertState::NoDetections);
    }
}
