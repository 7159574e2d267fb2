//! Albums and their membership rows.

use chrono::Utc;
use rusqlite::{params, Row};

use super::images::image_from_row;
use super::{tags_from_sql, tags_to_sql, Database};
use crate::error::Result;
use crate::models::{Album, AlbumId, Image, ImageId, Membership, MembershipSource, UserId};

const ALBUM_COLUMNS: &str = "id, owner_id, name, tags, cover_image_id, created_at";

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    let tags: String = row.get(3)?;
    Ok(Album {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        tags: tags_from_sql(3, &tags)?,
        cover_image_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Database {
    /// Insert an album with no tags.
    pub fn insert_album(&self, owner_id: UserId, name: &str, cover_image_id: Option<ImageId>) -> Result<Album> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO albums (owner_id, name, tags, cover_image_id, created_at) VALUES (?, ?, '[]', ?, ?)",
            params![owner_id, name, cover_image_id, created_at],
        )?;

        Ok(Album {
            id: self.conn.last_insert_rowid(),
            owner_id,
            name: name.to_string(),
            tags: Vec::new(),
            cover_image_id,
            created_at,
        })
    }

    pub fn get_album(&self, id: AlbumId) -> Result<Option<Album>> {
        let result = self.conn.query_row(
            &format!("SELECT {} FROM albums WHERE id = ?", ALBUM_COLUMNS),
            [id],
            album_from_row,
        );
        match result {
            Ok(album) => Ok(Some(album)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The owner's albums, newest first.
    pub fn list_albums(&self, owner_id: UserId) -> Result<Vec<Album>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM albums WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
            ALBUM_COLUMNS
        ))?;
        let albums = stmt
            .query_map([owner_id], album_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    pub fn list_albums_of_others(&self, owner_id: UserId) -> Result<Vec<Album>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM albums WHERE owner_id != ? ORDER BY created_at DESC, id DESC",
            ALBUM_COLUMNS
        ))?;
        let albums = stmt
            .query_map([owner_id], album_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    pub fn update_album_tags(&self, id: AlbumId, tags: &[String]) -> Result<()> {
        self.conn.execute(
            "UPDATE albums SET tags = ? WHERE id = ?",
            params![tags_to_sql(tags)?, id],
        )?;
        Ok(())
    }

    pub fn set_album_cover(&self, id: AlbumId, cover_image_id: Option<ImageId>) -> Result<()> {
        self.conn.execute(
            "UPDATE albums SET cover_image_id = ? WHERE id = ?",
            params![cover_image_id, id],
        )?;
        Ok(())
    }

    /// Reset every album cover that points at `image_id`.
    pub fn clear_covers_for_image(&self, image_id: ImageId) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE albums SET cover_image_id = NULL WHERE cover_image_id = ?",
            [image_id],
        )?)
    }

    pub fn delete_album(&self, id: AlbumId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM albums WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    pub fn memberships(&self, album_id: AlbumId) -> Result<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT image_id, source FROM album_images WHERE album_id = ? ORDER BY image_id",
        )?;
        let rows = stmt
            .query_map([album_id], |row| {
                Ok((row.get::<_, ImageId>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let memberships = rows
            .into_iter()
            .filter_map(|(image_id, source)| match MembershipSource::parse(&source) {
                Some(source) => Some(Membership { image_id, source }),
                None => {
                    tracing::warn!(album_id, image_id, source = %source, "Ignoring membership with unknown source");
                    None
                }
            })
            .collect();
        Ok(memberships)
    }

    /// Insert a membership row. A manual insert promotes an existing tag row;
    /// a tag insert never demotes a manual one.
    pub fn add_membership(&self, album_id: AlbumId, image_id: ImageId, source: MembershipSource) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO album_images (album_id, image_id, source, added_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (album_id, image_id) DO UPDATE SET source = 'manual'
            WHERE excluded.source = 'manual'
            "#,
            params![album_id, image_id, source.as_str(), Utc::now()],
        )?;
        Ok(())
    }

    pub fn remove_membership(&self, album_id: AlbumId, image_id: ImageId) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM album_images WHERE album_id = ? AND image_id = ?",
            params![album_id, image_id],
        )?;
        Ok(removed > 0)
    }

    pub fn is_member(&self, album_id: AlbumId, image_id: ImageId) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM album_images WHERE album_id = ? AND image_id = ?)",
            params![album_id, image_id],
            |row| row.get(0),
        )?)
    }

    /// Member images of an album, newest first.
    pub fn album_images(&self, album_id: AlbumId) -> Result<Vec<Image>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.owner_id, i.storage_key, i.name, i.tags, i.uploaded_at
            FROM images i
            JOIN album_images ai ON ai.image_id = i.id
            WHERE ai.album_id = ?
            ORDER BY i.uploaded_at DESC, i.id DESC
            "#,
        )?;
        let images = stmt
            .query_map([album_id], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, UserId, ImageId, AlbumId) {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user("ada").unwrap();
        let image = db.insert_image(ada.id, "a/1.jpg", "1.jpg", &[]).unwrap();
        let album = db.insert_album(ada.id, "Trips", None).unwrap();
        (db, ada.id, image.id, album.id)
    }

    #[test]
    fn test_manual_insert_promotes_tag_member() {
        let (db, _, image_id, album_id) = setup();
        db.add_membership(album_id, image_id, MembershipSource::Tag).unwrap();
        assert_eq!(db.memberships(album_id).unwrap()[0].source, MembershipSource::Tag);

        db.add_membership(album_id, image_id, MembershipSource::Manual).unwrap();
        assert_eq!(db.memberships(album_id).unwrap()[0].source, MembershipSource::Manual);
    }

    #[test]
    fn test_tag_insert_never_demotes_manual() {
        let (db, _, image_id, album_id) = setup();
        db.add_membership(album_id, image_id, MembershipSource::Manual).unwrap();
        db.add_membership(album_id, image_id, MembershipSource::Tag).unwrap();

        let memberships = db.memberships(album_id).unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].source, MembershipSource::Manual);
    }

    #[test]
    fn test_album_tags_and_cover() {
        let (db, owner, image_id, album_id) = setup();
        db.update_album_tags(album_id, &["Beach".to_string()]).unwrap();
        db.set_album_cover(album_id, Some(image_id)).unwrap();

        let album = db.get_album(album_id).unwrap().unwrap();
        assert_eq!(album.tags, vec!["Beach"]);
        assert_eq!(album.cover_image_id, Some(image_id));

        assert_eq!(db.clear_covers_for_image(image_id).unwrap(), 1);
        assert_eq!(db.get_album(album_id).unwrap().unwrap().cover_image_id, None);
        assert_eq!(db.list_albums(owner).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_membership() {
        let (db, _, image_id, album_id) = setup();
        db.add_membership(album_id, image_id, MembershipSource::Manual).unwrap();
        assert!(db.is_member(album_id, image_id).unwrap());
        assert_eq!(db.album_images(album_id).unwrap().len(), 1);

        assert!(db.remove_membership(album_id, image_id).unwrap());
        assert!(!db.remove_membership(album_id, image_id).unwrap());
        assert!(!db.is_member(album_id, image_id).unwrap());
    }

    #[test]
    fn test_delete_album_drops_memberships() {
        let (db, _, image_id, album_id) = setup();
        db.add_membership(album_id, image_id, MembershipSource::Manual).unwrap();
        assert!(db.delete_album(album_id).unwrap());
        assert!(db.get_album(album_id).unwrap().is_none());
        assert!(db.memberships(album_id).unwrap().is_empty());
        assert!(db.get_image(image_id).unwrap().is_some());
    }
}
