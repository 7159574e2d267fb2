//! Image label detection.
//!
//! A [`LabelDetector`] turns raw image bytes into `(label, confidence)` pairs.
//! Only the best few label names become tag suggestions, see [`top_labels`].

pub mod provider;

pub use provider::{create_detector, LabelDetector};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A label reported by the detector. Confidence is a percentage (0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
}

/// Label names sorted by descending confidence, truncated to `top_n`.
///
/// Blank names and labels under `min_confidence` are dropped; a name
/// repeated by the detector is kept once, at its best confidence.
pub fn top_labels(mut labels: Vec<DetectedLabel>, top_n: usize, min_confidence: f32) -> Vec<String> {
    labels.retain(|l| !l.name.trim().is_empty() && l.confidence >= min_confidence);
    labels.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let names = labels.into_iter().map(|l| l.name.trim().to_string());
    let mut out = crate::tags::normalize_tags(names);
    out.truncate(top_n);
    out
}
