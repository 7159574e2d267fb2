//! Vocabulary embedding cache.

use rusqlite::params;
use std::collections::HashMap;

use super::Database;
use crate::embeddings::{bytes_to_embedding, embedding_to_bytes};
use crate::error::Result;

impl Database {
    /// Store the vector of one vocabulary label for `model_name`.
    pub fn store_label_embedding(&self, label: &str, model_name: &str, embedding: &[f32]) -> Result<()> {
        let bytes = embedding_to_bytes(embedding);

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO label_embeddings (label, model_name, embedding, embedding_dim, created_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
            params![label, model_name, bytes, embedding.len() as i64],
        )?;

        Ok(())
    }

    /// Every cached label vector for `model_name`.
    pub fn load_label_embeddings(&self, model_name: &str) -> Result<HashMap<String, Vec<f32>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label, embedding FROM label_embeddings WHERE model_name = ?")?;

        let rows = stmt
            .query_map([model_name], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok((row.get::<_, String>(0)?, bytes_to_embedding(&bytes)))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        Ok(rows)
    }

    /// Drop cached vectors for `model_name`, forcing a re-embed on the next build.
    pub fn clear_label_embeddings(&self, model_name: &str) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM label_embeddings WHERE model_name = ?", [model_name])?)
    }
}
