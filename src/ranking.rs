//! Prompt-to-tag ranking.
//!
//! A free-text prompt is embedded and compared against every vocabulary
//! label. The best `top_k` labels are split into positive and negative
//! depending on whether the prompt negates them ("no dogs", "without sky").

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::embeddings::{EmbeddingIndex, TextEmbedder};

pub const DEFAULT_TOP_K: usize = 15;

/// Outcome of ranking one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranking {
    /// The top labels with their scores, best first.
    pub scored: Vec<(String, f32)>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl Ranking {
    /// Positive labels that exist on the owner's images and are not negated.
    /// Empty means there is nothing to update the album with.
    pub fn album_tags(&self, existing_tags: &HashSet<String>) -> Vec<String> {
        let negative: HashSet<&str> = self.negative.iter().map(String::as_str).collect();
        self.positive
            .iter()
            .filter(|t| existing_tags.contains(t.as_str()))
            .filter(|t| !negative.contains(t.as_str()))
            .cloned()
            .collect()
    }
}

pub struct TagRanker {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn TextEmbedder>,
    top_k: usize,
}

impl TagRanker {
    pub fn new(index: Arc<EmbeddingIndex>, embedder: Arc<dyn TextEmbedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn rank(&self, prompt: &str) -> Result<Ranking> {
        if self.index.is_empty() {
            tracing::debug!("Embedding index empty, nothing to rank");
            return Ok(Ranking::default());
        }
        let query = self.embedder.embed(prompt)?;
        Ok(rank_with_vector(&self.index, prompt, &query, self.top_k))
    }
}

/// Rank the index against an already embedded prompt.
pub fn rank_with_vector(index: &EmbeddingIndex, prompt: &str, query: &[f32], top_k: usize) -> Ranking {
    let mut scored = index.score(query);
    // Stable: equal scores keep vocabulary order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);

    let mut ranking = Ranking::default();
    for (label, score) in scored {
        if is_negated(prompt, label) {
            ranking.negative.push(label.to_string());
        } else {
            ranking.positive.push(label.to_string());
        }
        ranking.scored.push((label.to_string(), score));
    }
    ranking
}

/// Whether `prompt` contains "no <label>" or "without <label>" as whole words.
/// Case-insensitive; whitespace inside multi-word labels matches any run of
/// whitespace, and the last word may carry a plural "s" or "es" ("no dogs").
pub fn is_negated(prompt: &str, label: &str) -> bool {
    let words: Vec<String> = label.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return false;
    }
    let pattern = format!(
        r"(?i)(?:^|[^\p{{L}}\p{{N}}_])(?:no|without)\s+{}(?:e?s)?(?:$|[^\p{{L}}\p{{N}}_])",
        words.join(r"\s+")
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(prompt),
        Err(e) => {
            tracing::warn!(label = %label, error = %e, "Invalid negation pattern");
            false
        }
    }
}
