//! Label embedding index.
//!
//! Built once from a [`Vocabulary`] and a [`TextEmbedder`], then shared
//! read-only (usually behind an `Arc`) by every prompt ranking.

use anyhow::Result;

use super::provider::TextEmbedder;
use super::vocabulary::Vocabulary;
use super::cosine_similarity;
use crate::db::Database;

/// One vocabulary label and its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingEntry {
    pub label: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    model_name: String,
    entries: Vec<EmbeddingEntry>,
}

impl EmbeddingIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from precomputed entries. Entries keep the given order.
    pub fn from_entries(model_name: &str, entries: Vec<EmbeddingEntry>) -> Self {
        Self {
            model_name: model_name.to_string(),
            entries,
        }
    }

    /// Embed every vocabulary label.
    ///
    /// With a `cache`, vectors already stored for the embedder's model are
    /// reused and newly computed ones are written back. Labels that fail to
    /// embed, or whose dimension disagrees with the first vector, are skipped.
    pub fn build(
        vocabulary: &Vocabulary,
        embedder: &dyn TextEmbedder,
        cache: Option<&Database>,
    ) -> Result<Self> {
        let model_name = embedder.model_name().to_string();
        let cached = match cache {
            Some(db) => db.load_label_embeddings(&model_name)?,
            None => Default::default(),
        };

        let mut entries = Vec::with_capacity(vocabulary.len());
        let mut dim: Option<usize> = None;
        let mut computed = 0usize;
        let mut skipped = 0usize;

        for label in vocabulary.labels() {
            let vector = match cached.get(label) {
                Some(v) => v.clone(),
                None => match embedder.embed(label) {
                    Ok(v) => {
                        computed += 1;
                        if let Some(db) = cache {
                            db.store_label_embedding(label, &model_name, &v)?;
                        }
                        v
                    }
                    Err(e) => {
                        tracing::warn!(label = %label, error = %e, "Failed to embed vocabulary label");
                        skipped += 1;
                        continue;
                    }
                },
            };

            match dim {
                None => dim = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    tracing::warn!(label = %label, expected = d, got = vector.len(), "Embedding dimension mismatch");
                    skipped += 1;
                    continue;
                }
                Some(_) => {}
            }

            entries.push(EmbeddingEntry {
                label: label.clone(),
                vector,
            });
        }

        tracing::info!(
            model = %model_name,
            labels = entries.len(),
            computed,
            skipped,
            "Embedding index ready"
        );

        Ok(Self {
            model_name,
            entries,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn entries(&self) -> &[EmbeddingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cosine similarity of `query` against every label, in index order.
    pub fn score(&self, query: &[f32]) -> Vec<(&str, f32)> {
        self.entries
            .iter()
            .map(|e| (e.label.as_str(), cosine_similarity(query, &e.vector)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a fixed table of words; anything else fails.
    struct TableEmbedder {
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextEmbedder for TableEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match text {
                "Dog" => Ok(vec![1.0, 0.0]),
                "Cat" => Ok(vec![0.0, 1.0]),
                "Wide" => Ok(vec![1.0, 1.0, 1.0]),
                _ => Err(anyhow!("unknown word")),
            }
        }

        fn model_name(&self) -> &str {
            "table"
        }

        fn provider_name(&self) -> &'static str {
            "test"
        }
    }

    #[test]
    fn test_build_skips_failures_and_mismatched_dims() {
        let vocabulary = Vocabulary::from_labels(["Dog", "Unknown", "Cat", "Wide"]);
        let index = EmbeddingIndex::build(&vocabulary, &TableEmbedder::new(), None).unwrap();

        let labels: Vec<&str> = index.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Dog", "Cat"]);
        assert_eq!(index.model_name(), "table");
        assert_eq!(index.entries()[1].vector, vec![0.0, 1.0]);
    }

    #[test]
    fn test_build_reuses_cache() {
        let db = Database::open_in_memory().unwrap();
        let vocabulary = Vocabulary::from_labels(["Dog", "Cat"]);

        let first = TableEmbedder::new();
        EmbeddingIndex::build(&vocabulary, &first, Some(&db)).unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 2);

        let second = TableEmbedder::new();
        let index = EmbeddingIndex::build(&vocabulary, &second, Some(&db)).unwrap();
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[0].label, "Dog");
        assert_eq!(index.entries()[0].vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_score_keeps_index_order() {
        let index = EmbeddingIndex::from_entries(
            "m",
            vec![
                EmbeddingEntry { label: "A".into(), vector: vec![1.0, 0.0] },
                EmbeddingEntry { label: "B".into(), vector: vec![0.0, 0.0] },
            ],
        );
        let scores = index.score(&[1.0, 0.0]);
        assert_eq!(scores[0].0, "A");
        assert!((scores[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(scores[1], ("B", 0.0));
    }
}
