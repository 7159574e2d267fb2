//! Image records and their tags.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{tags_from_sql, tags_to_sql, Database};
use crate::error::Result;
use crate::models::{Image, ImageId, UserId};

const IMAGE_COLUMNS: &str = "id, owner_id, storage_key, name, tags, uploaded_at";

pub(crate) fn image_from_row(row: &Row) -> rusqlite::Result<Image> {
    let tags: String = row.get(4)?;
    Ok(Image {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        storage_key: row.get(2)?,
        name: row.get(3)?,
        tags: tags_from_sql(4, &tags)?,
        uploaded_at: row.get(5)?,
    })
}

impl Database {
    pub fn insert_image(
        &self,
        owner_id: UserId,
        storage_key: &str,
        name: &str,
        tags: &[String],
    ) -> Result<Image> {
        let uploaded_at = Utc::now();
        self.conn.execute(
            "INSERT INTO images (owner_id, storage_key, name, tags, uploaded_at) VALUES (?, ?, ?, ?, ?)",
            params![owner_id, storage_key, name, tags_to_sql(tags)?, uploaded_at],
        )?;

        Ok(Image {
            id: self.conn.last_insert_rowid(),
            owner_id,
            storage_key: storage_key.to_string(),
            name: name.to_string(),
            tags: tags.to_vec(),
            uploaded_at,
        })
    }

    pub fn get_image(&self, id: ImageId) -> Result<Option<Image>> {
        let result = self.conn.query_row(
            &format!("SELECT {} FROM images WHERE id = ?", IMAGE_COLUMNS),
            [id],
            image_from_row,
        );
        match result {
            Ok(image) => Ok(Some(image)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The owner's images, newest first.
    pub fn list_images(&self, owner_id: UserId) -> Result<Vec<Image>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM images WHERE owner_id = ? ORDER BY uploaded_at DESC, id DESC",
            IMAGE_COLUMNS
        ))?;
        let images = stmt
            .query_map([owner_id], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    /// Images of every user except `owner_id`, newest first.
    pub fn list_images_of_others(&self, owner_id: UserId) -> Result<Vec<Image>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM images WHERE owner_id != ? ORDER BY uploaded_at DESC, id DESC",
            IMAGE_COLUMNS
        ))?;
        let images = stmt
            .query_map([owner_id], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    pub fn storage_key_exists(&self, storage_key: &str) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM images WHERE storage_key = ?)",
            [storage_key],
            |row| row.get(0),
        )?)
    }

    pub fn update_image_tags(&self, id: ImageId, tags: &[String]) -> Result<()> {
        self.conn.execute(
            "UPDATE images SET tags = ? WHERE id = ?",
            params![tags_to_sql(tags)?, id],
        )?;
        Ok(())
    }

    pub fn rename_image(&self, id: ImageId, name: &str) -> Result<()> {
        self.conn
            .execute("UPDATE images SET name = ? WHERE id = ?", params![name, id])?;
        Ok(())
    }

    /// Delete the image record. Memberships cascade; covers are reset to NULL.
    pub fn delete_image(&self, id: ImageId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM images WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }
}
