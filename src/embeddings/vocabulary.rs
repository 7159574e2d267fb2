//! Candidate label list loaded from a CSV file.
//!
//! The first column of every record is a label; the header row is skipped.
//! Blank cells are dropped and duplicates keep their first position.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let labels = labels
            .into_iter()
            .map(Into::into)
            .map(|l: String| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .filter(|l| seen.insert(l.clone()))
            .collect();
        Self { labels }
    }

    /// Read labels from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open vocabulary {}", path.display()))?;

        let mut labels = Vec::new();
        for record in reader.records() {
            let record = record
                .with_context(|| format!("Failed to read vocabulary {}", path.display()))?;
            if let Some(label) = record.get(0) {
                labels.push(label.to_string());
            }
        }

        let vocabulary = Self::from_labels(labels);
        tracing::info!(path = ?path, labels = vocabulary.len(), "Loaded label vocabulary");
        Ok(vocabulary)
    }

    /// Like [`Vocabulary::load`], but an unreadable file yields an empty vocabulary.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(vocabulary) => vocabulary,
            Err(e) => {
                tracing::warn!(path = ?path, error = %format!("{:#}", e), "Vocabulary unavailable, prompt ranking disabled");
                Self::default()
            }
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
