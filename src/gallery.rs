//! The gallery service: every user-facing operation on users, images and albums.
//!
//! Owner-scoped operations treat an entity owned by someone else exactly like
//! a missing one (`NotFound`). Multi-row mutations run in one transaction and
//! finish by re-deriving album membership, see [`crate::reconcile`].

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::analytics::{self, TagAnalytics};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::labels::{self, LabelDetector};
use crate::models::{Album, AlbumId, AlbumView, Image, ImageId, MembershipSource, Profile, User, UserId};
use crate::ranking::{Ranking, TagRanker};
use crate::reconcile::{self, MembershipPlan};
use crate::storage::{self, ObjectStore};
use crate::tags;

/// Result of an upload: the stored image (no tags yet) and the suggestions
/// to confirm with [`Gallery::finalize_tags`].
#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub image: Image,
    pub suggested_tags: Vec<String>,
}

/// Result of re-tagging an album from a prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptUpdate {
    pub album: Album,
    pub ranking: Ranking,
}

pub struct Gallery {
    db: Database,
    store: Box<dyn ObjectStore>,
    detector: Option<Box<dyn LabelDetector>>,
    ranker: Option<TagRanker>,
    top_n: usize,
    min_confidence: f32,
}

impl Gallery {
    pub fn new(db: Database, store: Box<dyn ObjectStore>) -> Self {
        Self {
            db,
            store,
            detector: None,
            ranker: None,
            top_n: 5,
            min_confidence: 0.0,
        }
    }

    pub fn with_detector(mut self, detector: Option<Box<dyn LabelDetector>>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_ranker(mut self, ranker: Option<TagRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    /// How many detected labels become suggestions, and the confidence floor.
    pub fn with_label_limits(mut self, top_n: usize, min_confidence: f32) -> Self {
        self.top_n = top_n;
        self.min_confidence = min_confidence;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn image_url(&self, image: &Image) -> String {
        self.store.url(&image.storage_key)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn register_user(&self, username: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::bad_request("Username is required"));
        }
        let user = self.db.create_user(username)?;
        tracing::info!(user_id = user.id, username = %user.username, "Registered user");
        Ok(user)
    }

    pub fn user_by_name(&self, username: &str) -> Result<User> {
        self.db
            .get_user_by_username(username)?
            .ok_or_else(|| Error::not_found("User", username))
    }

    pub fn profile(&self, username: &str) -> Result<Profile> {
        let user = self.user_by_name(username)?;
        Ok(Profile {
            image_count: self.db.count_images(user.id)?,
            album_count: self.db.count_albums(user.id)?,
            user,
        })
    }

    /// Delete the user with all their images and albums. Stored objects are
    /// removed afterwards; failures there are logged and ignored.
    pub fn delete_account(&self, user_id: UserId) -> Result<()> {
        let images = self.db.list_images(user_id)?;
        let deleted = self.db.delete_user(user_id)?;
        if !deleted {
            return Err(Error::not_found("User", user_id));
        }

        for image in &images {
            self.delete_object(&image.storage_key);
        }
        tracing::info!(user_id, images = images.len(), "Deleted account");
        Ok(())
    }

    /// Users whose name contains `query`, ignoring case. An empty query matches everyone.
    pub fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let needle = query.trim().to_lowercase();
        let users = self.db.list_users()?;
        Ok(users
            .into_iter()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .collect())
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Detect labels in `bytes` and return the best label names. Nothing is stored.
    pub fn suggest_tags(&self, bytes: &[u8]) -> Result<Vec<String>> {
        if bytes.is_empty() {
            return Err(Error::bad_request("No image provided"));
        }
        let detector = self
            .detector
            .as_ref()
            .ok_or_else(|| Error::Unavailable("Label detection is not configured".to_string()))?;
        self.detect(detector.as_ref(), bytes)
    }

    fn detect(&self, detector: &dyn LabelDetector, bytes: &[u8]) -> Result<Vec<String>> {
        let detected = detector
            .detect_labels(bytes)
            .map_err(|e| Error::external("Label detection", e))?;
        let suggestions = labels::top_labels(detected, self.top_n, self.min_confidence);
        tracing::debug!(provider = detector.provider_name(), suggestions = ?suggestions, "Detected labels");
        Ok(suggestions)
    }

    /// Store the image bytes and create the image record with no tags.
    ///
    /// When label detection fails the stored object is removed and no record
    /// is created. Without a configured detector the upload succeeds with no
    /// suggestions.
    pub fn upload_image(&self, owner_id: UserId, filename: &str, bytes: &[u8]) -> Result<Upload> {
        if bytes.is_empty() {
            return Err(Error::bad_request("No image provided"));
        }
        let filename = storage::sanitize_filename(filename)
            .ok_or_else(|| Error::bad_request("A file name is required"))?;
        self.existing_user(owner_id)?;

        let key = storage::unique_upload_key(owner_id, &filename, |key| {
            Ok(self.store.exists(key)? || self.db.storage_key_exists(key)?)
        })
        .map_err(|e| Error::external("Object store", e))?;

        self.store
            .put(&key, bytes)
            .map_err(|e| Error::external("Object store", e))?;

        let suggested_tags = match &self.detector {
            Some(detector) => match self.detect(detector.as_ref(), bytes) {
                Ok(tags) => tags,
                Err(e) => {
                    self.delete_object(&key);
                    return Err(e);
                }
            },
            None => {
                tracing::info!("Label detection not configured, no tag suggestions");
                Vec::new()
            }
        };

        let image = match self.db.insert_image(owner_id, &key, &filename, &[]) {
            Ok(image) => image,
            Err(e) => {
                self.delete_object(&key);
                return Err(e);
            }
        };

        tracing::info!(image_id = image.id, key = %key, suggestions = suggested_tags.len(), "Uploaded image");
        Ok(Upload {
            image,
            suggested_tags,
        })
    }

    /// Replace an image's tags with the confirmed list and refresh the owner's albums.
    pub fn finalize_tags(&self, owner_id: UserId, image_id: ImageId, confirmed: &[String]) -> Result<Image> {
        let mut image = self.owned_image(owner_id, image_id)?;
        let tags = tags::normalize_tags(confirmed);
        self.set_image_tags(&mut image, tags)?;
        Ok(image)
    }

    /// Confirm every suggestion of a fresh upload. The returned upload carries
    /// the finalized image.
    pub fn accept_suggestions(&self, upload: Upload) -> Result<Upload> {
        if upload.suggested_tags.is_empty() {
            return Ok(upload);
        }
        let image = self.finalize_tags(upload.image.owner_id, upload.image.id, &upload.suggested_tags)?;
        Ok(Upload {
            image,
            suggested_tags: upload.suggested_tags,
        })
    }

    /// Manual tag edit. At least one tag is required; tags are capitalized.
    pub fn edit_tags(&self, owner_id: UserId, image_id: ImageId, edited: &[String]) -> Result<Image> {
        let tags = tags::capitalize_tags(edited);
        if tags.is_empty() {
            return Err(Error::bad_request("An image must have at least one tag"));
        }
        let mut image = self.owned_image(owner_id, image_id)?;
        self.set_image_tags(&mut image, tags)?;
        Ok(image)
    }

    fn set_image_tags(&self, image: &mut Image, tags: Vec<String>) -> Result<()> {
        self.db.in_transaction(|db| {
            db.update_image_tags(image.id, &tags)?;
            self.refresh_owner_albums(image.owner_id)
        })?;
        tracing::info!(image_id = image.id, tags = ?tags, "Updated image tags");
        image.tags = tags;
        Ok(())
    }

    pub fn rename_image(&self, owner_id: UserId, image_id: ImageId, name: &str) -> Result<Image> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::bad_request("Image name is required"));
        }
        let mut image = self.owned_image(owner_id, image_id)?;
        self.db.rename_image(image_id, name)?;
        image.name = name.to_string();
        Ok(image)
    }

    /// Delete the image record, detaching it from every album and clearing
    /// covers that point at it, then remove the stored object.
    pub fn delete_image(&self, owner_id: UserId, image_id: ImageId) -> Result<()> {
        let image = self.owned_image(owner_id, image_id)?;
        self.db.in_transaction(|db| {
            db.clear_covers_for_image(image_id)?;
            db.delete_image(image_id)
        })?;
        self.delete_object(&image.storage_key);
        tracing::info!(image_id, "Deleted image");
        Ok(())
    }

    pub fn list_images(&self, owner_id: UserId) -> Result<Vec<Image>> {
        self.db.list_images(owner_id)
    }

    /// Another user's images, newest first. A user with no images is reported
    /// like a missing one.
    pub fn user_images(&self, user_id: UserId) -> Result<Vec<Image>> {
        self.existing_user(user_id)?;
        let images = self.db.list_images(user_id)?;
        if images.is_empty() {
            return Err(Error::not_found("Images of user", user_id));
        }
        Ok(images)
    }

    pub fn image_detail(&self, image_id: ImageId) -> Result<Image> {
        self.db
            .get_image(image_id)?
            .ok_or_else(|| Error::not_found("Image", image_id))
    }

    /// Every distinct tag on the owner's images, sorted.
    pub fn user_tags(&self, owner_id: UserId) -> Result<Vec<String>> {
        let tags: BTreeSet<String> = self
            .db
            .list_images(owner_id)?
            .into_iter()
            .flat_map(|image| image.tags)
            .collect();
        Ok(tags.into_iter().collect())
    }

    /// Images of other users having a tag that contains `search`, ignoring case.
    pub fn explore_images(&self, viewer_id: UserId, search: Option<&str>) -> Result<Vec<Image>> {
        let images = self.db.list_images_of_others(viewer_id)?;
        let needle = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_lowercase(),
            None => return Ok(images),
        };
        Ok(images
            .into_iter()
            .filter(|image| image.tags.iter().any(|t| t.to_lowercase().contains(&needle)))
            .collect())
    }

    // ========================================================================
    // Albums
    // ========================================================================

    /// Create an album. A cover given here becomes a manual member.
    pub fn create_album(&self, owner_id: UserId, name: &str, cover_image_id: Option<ImageId>) -> Result<Album> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::bad_request("Album name is required"));
        }
        if let Some(cover) = cover_image_id {
            if self.owned_image(owner_id, cover).is_err() {
                return Err(Error::bad_request("The cover must be one of your images"));
            }
        }

        let album = self.db.in_transaction(|db| {
            let album = db.insert_album(owner_id, name, cover_image_id)?;
            if let Some(cover) = cover_image_id {
                db.add_membership(album.id, cover, MembershipSource::Manual)?;
            }
            Ok(album)
        })?;
        tracing::info!(album_id = album.id, name = %album.name, "Created album");
        Ok(album)
    }

    pub fn list_albums(&self, owner_id: UserId) -> Result<Vec<Album>> {
        self.db.list_albums(owner_id)
    }

    /// Another user's albums. A user with no albums is reported like a missing one.
    pub fn user_albums(&self, user_id: UserId) -> Result<Vec<Album>> {
        self.existing_user(user_id)?;
        let albums = self.db.list_albums(user_id)?;
        if albums.is_empty() {
            return Err(Error::not_found("Albums of user", user_id));
        }
        Ok(albums)
    }

    pub fn delete_album(&self, owner_id: UserId, album_id: AlbumId) -> Result<()> {
        self.owned_album(owner_id, album_id)?;
        self.db.delete_album(album_id)?;
        tracing::info!(album_id, "Deleted album");
        Ok(())
    }

    /// The album with its members, after bringing membership up to date.
    pub fn album_view(&self, album_id: AlbumId) -> Result<AlbumView> {
        let album = self
            .db
            .get_album(album_id)?
            .ok_or_else(|| Error::not_found("Album", album_id))?;

        self.db.in_transaction(|_| self.refresh_album(&album))?;

        let album = self
            .db
            .get_album(album_id)?
            .ok_or_else(|| Error::not_found("Album", album_id))?;
        let owner_username = self
            .db
            .get_user(album.owner_id)?
            .map(|u| u.username)
            .unwrap_or_default();
        let images = self.db.album_images(album_id)?;

        Ok(AlbumView {
            album,
            owner_username,
            images,
        })
    }

    /// Pin images into the album. Only the owner's images are accepted.
    /// Returns how many were added.
    pub fn add_images(&self, owner_id: UserId, album_id: AlbumId, image_ids: &[ImageId]) -> Result<usize> {
        if image_ids.is_empty() {
            return Err(Error::bad_request("No images selected"));
        }
        self.owned_album(owner_id, album_id)?;

        let owned: HashSet<ImageId> = self.db.list_images(owner_id)?.iter().map(|i| i.id).collect();
        let accepted: BTreeSet<ImageId> = image_ids.iter().copied().filter(|id| owned.contains(id)).collect();
        if accepted.is_empty() {
            return Err(Error::bad_request("None of the selected images belong to you"));
        }

        self.db.in_transaction(|db| {
            for &image_id in &accepted {
                db.add_membership(album_id, image_id, MembershipSource::Manual)?;
            }
            Ok(())
        })?;
        tracing::info!(album_id, added = accepted.len(), "Added images to album");
        Ok(accepted.len())
    }

    /// Take an image out of the album. Clears the cover if it was that image.
    ///
    /// An image that still matches the album's tags comes back on the next refresh.
    pub fn remove_image(&self, owner_id: UserId, album_id: AlbumId, image_id: ImageId) -> Result<Album> {
        let mut album = self.owned_album(owner_id, album_id)?;
        if !self.db.is_member(album_id, image_id)? {
            return Err(Error::bad_request("Image is not in this album"));
        }

        self.db.in_transaction(|db| {
            db.remove_membership(album_id, image_id)?;
            if album.cover_image_id == Some(image_id) {
                db.set_album_cover(album_id, None)?;
            }
            Ok(())
        })?;
        if album.cover_image_id == Some(image_id) {
            album.cover_image_id = None;
        }
        Ok(album)
    }

    pub fn set_cover(&self, owner_id: UserId, album_id: AlbumId, image_id: ImageId) -> Result<Album> {
        let mut album = self.owned_album(owner_id, album_id)?;
        if !self.db.is_member(album_id, image_id)? {
            return Err(Error::bad_request("The cover must be an image in this album"));
        }
        self.db.set_album_cover(album_id, Some(image_id))?;
        album.cover_image_id = Some(image_id);
        Ok(album)
    }

    pub fn add_album_tags(&self, owner_id: UserId, album_id: AlbumId, added: &[String]) -> Result<Album> {
        let added = tags::normalize_tags(added);
        if added.is_empty() {
            return Err(Error::bad_request("No tags provided"));
        }
        let album = self.owned_album(owner_id, album_id)?;
        let new_tags = tags::union_tags(&album.tags, &added);
        self.replace_album_tags(album, new_tags)
    }

    /// Drop tags from the album. Images matched only through them leave the
    /// album; manually added images stay.
    pub fn remove_album_tags(&self, owner_id: UserId, album_id: AlbumId, removed: &[String]) -> Result<Album> {
        let removed = tags::normalize_tags(removed);
        if removed.is_empty() {
            return Err(Error::bad_request("No tags provided"));
        }
        let album = self.owned_album(owner_id, album_id)?;
        let new_tags = tags::difference_tags(&album.tags, &removed);
        self.replace_album_tags(album, new_tags)
    }

    /// Rank the vocabulary against `prompt` and make the surviving tags the
    /// album's tags. Nothing changes when no ranked tag exists on the owner's
    /// images.
    pub fn update_album_tags_from_prompt(&self, owner_id: UserId, album_id: AlbumId, prompt: &str) -> Result<PromptUpdate> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::bad_request("Prompt is required"));
        }
        let album = self.owned_album(owner_id, album_id)?;
        let ranker = self
            .ranker
            .as_ref()
            .ok_or_else(|| Error::Unavailable("Prompt ranking is not configured".to_string()))?;

        let ranking = ranker
            .rank(prompt)
            .map_err(|e| Error::external("Text embedding", e))?;
        let existing: HashSet<String> = self.user_tags(owner_id)?.into_iter().collect();
        let new_tags = ranking.album_tags(&existing);
        if new_tags.is_empty() {
            tracing::info!(album_id, prompt = %prompt, "Prompt matched no existing tags");
            return Err(Error::NoValidTags);
        }

        let album = self.replace_album_tags(album, new_tags)?;
        Ok(PromptUpdate { album, ranking })
    }

    /// Albums of other users whose name contains `search`, ignoring case.
    pub fn explore_albums(&self, viewer_id: UserId, search: Option<&str>) -> Result<Vec<Album>> {
        let albums = self.db.list_albums_of_others(viewer_id)?;
        let needle = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_lowercase(),
            None => return Ok(albums),
        };
        Ok(albums
            .into_iter()
            .filter(|album| album.name.to_lowercase().contains(&needle))
            .collect())
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    pub fn analytics(&self, owner_id: UserId) -> Result<TagAnalytics> {
        let images = self.db.list_images(owner_id)?;
        Ok(analytics::aggregate(&images))
    }

    // ========================================================================
    // Membership refresh
    // ========================================================================

    fn replace_album_tags(&self, mut album: Album, new_tags: Vec<String>) -> Result<Album> {
        album.tags = new_tags;
        let plan = self.db.in_transaction(|db| {
            db.update_album_tags(album.id, &album.tags)?;
            self.refresh_album(&album)
        })?;
        if plan.clear_cover {
            album.cover_image_id = None;
        }
        tracing::info!(album_id = album.id, tags = ?album.tags, "Updated album tags");
        Ok(album)
    }

    /// Bring the stored membership of `album` in line with its tags and the
    /// owner's current images. Callers provide the transaction.
    fn refresh_album(&self, album: &Album) -> Result<MembershipPlan> {
        let candidates = self.db.list_images(album.owner_id)?;
        let current = self.db.memberships(album.id)?;
        let plan = reconcile::plan(&album.tags, &candidates, &current, album.cover_image_id);
        if plan.is_noop() {
            return Ok(plan);
        }

        for &image_id in &plan.to_add {
            self.db.add_membership(album.id, image_id, MembershipSource::Tag)?;
        }
        for &image_id in &plan.to_evict {
            self.db.remove_membership(album.id, image_id)?;
        }
        if plan.clear_cover {
            self.db.set_album_cover(album.id, None)?;
        }

        tracing::debug!(
            album_id = album.id,
            added = plan.to_add.len(),
            evicted = plan.to_evict.len(),
            cover_cleared = plan.clear_cover,
            "Refreshed album membership"
        );
        Ok(plan)
    }

    fn refresh_owner_albums(&self, owner_id: UserId) -> Result<()> {
        for album in self.db.list_albums(owner_id)? {
            self.refresh_album(&album)?;
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn existing_user(&self, user_id: UserId) -> Result<User> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| Error::not_found("User", user_id))
    }

    fn owned_image(&self, owner_id: UserId, image_id: ImageId) -> Result<Image> {
        match self.db.get_image(image_id)? {
            Some(image) if image.owner_id == owner_id => Ok(image),
            _ => Err(Error::not_found("Image", image_id)),
        }
    }

    fn owned_album(&self, owner_id: UserId, album_id: AlbumId) -> Result<Album> {
        match self.db.get_album(album_id)? {
            Some(album) if album.owner_id == owner_id => Ok(album),
            _ => Err(Error::not_found("Album", album_id)),
        }
    }

    fn delete_object(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            tracing::warn!(key = %key, error = %format!("{:#}", e), "Failed to delete stored object");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingEntry, EmbeddingIndex, TextEmbedder};
    use crate::labels::DetectedLabel;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory object store; `fail_deletes` makes every delete fail.
    #[derive(Clone, Default)]
    struct MemoryStore {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        fail_deletes: bool,
    }

    impl MemoryStore {
        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }
    }

    impl ObjectStore for MemoryStore {
        fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
            Ok(())
        }

        fn delete(&self, key: &str) -> anyhow::Result<()> {
            if self.fail_deletes {
                return Err(anyhow!("store offline"));
            }
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        fn exists(&self, key: &str) -> anyhow::Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        fn url(&self, key: &str) -> String {
            format!("mem://{}", key)
        }
    }

    struct FakeDetector {
        labels: Vec<DetectedLabel>,
        fail: bool,
    }

    impl LabelDetector for FakeDetector {
        fn detect_labels(&self, _image: &[u8]) -> anyhow::Result<Vec<DetectedLabel>> {
            if self.fail {
                return Err(anyhow!("service unavailable"));
            }
            Ok(self.labels.clone())
        }

        fn provider_name(&self) -> &'static str {
            "fake"
        }
    }

    fn detector(labels: &[(&str, f32)]) -> Box<dyn LabelDetector> {
        Box::new(FakeDetector {
            labels: labels
                .iter()
                .map(|(name, confidence)| DetectedLabel {
                    name: name.to_string(),
                    confidence: *confidence,
                })
                .collect(),
            fail: false,
        })
    }

    /// Embeds by looking up a fixed word -> vector table; unknown text is the zero vector.
    struct KeywordEmbedder(HashMap<&'static str, Vec<f32>>);

    impl TextEmbedder for KeywordEmbedder {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let text = text.to_lowercase();
            let mut out = vec![0.0; 3];
            for (word, vector) in &self.0 {
                if text.contains(word) {
                    for (o, v) in out.iter_mut().zip(vector) {
                        *o += v;
                    }
                }
            }
            Ok(out)
        }

        fn model_name(&self) -> &str {
            "keywords"
        }

        fn provider_name(&self) -> &'static str {
            "fake"
        }
    }

    fn ranker() -> TagRanker {
        let table: HashMap<&'static str, Vec<f32>> = HashMap::from([
            ("beach", vec![1.0, 0.0, 0.0]),
            ("dog", vec![0.0, 1.0, 0.0]),
            ("mountain", vec![0.0, 0.0, 1.0]),
        ]);
        let index = EmbeddingIndex::from_entries(
            "keywords",
            vec![
                EmbeddingEntry { label: "Beach".into(), vector: vec![1.0, 0.0, 0.0] },
                EmbeddingEntry { label: "Dog".into(), vector: vec![0.0, 1.0, 0.0] },
                EmbeddingEntry { label: "Mountain".into(), vector: vec![0.0, 0.0, 1.0] },
            ],
        );
        TagRanker::new(Arc::new(index), Arc::new(KeywordEmbedder(table)), 2)
    }

    fn gallery(store: MemoryStore) -> Gallery {
        Gallery::new(Database::open_in_memory().unwrap(), Box::new(store))
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn member_ids(gallery: &Gallery, album_id: AlbumId) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = gallery
            .album_view(album_id)
            .unwrap()
            .images
            .iter()
            .map(|i| i.id)
            .collect();
        ids.sort();
        ids
    }

    /// A user with three tagged images: beach, dog, mountain+beach.
    fn seeded(gallery: &Gallery) -> (User, Vec<Image>) {
        let user = gallery.register_user("ada").unwrap();
        let mut images = Vec::new();
        for (name, image_tags) in [
            ("beach.jpg", &["Beach"][..]),
            ("dog.jpg", &["Dog"][..]),
            ("hike.jpg", &["Mountain", "Beach"][..]),
        ] {
            let upload = gallery.upload_image(user.id, name, b"bytes").unwrap();
            let image = gallery
                .finalize_tags(user.id, upload.image.id, &tags(image_tags))
                .unwrap();
            images.push(image);
        }
        (user, images)
    }

    #[test]
    fn test_register_rejects_blank_and_duplicate() {
        let gallery = gallery(MemoryStore::default());
        assert!(matches!(gallery.register_user("  "), Err(Error::BadRequest(_))));
        gallery.register_user("ada").unwrap();
        assert!(matches!(gallery.register_user("ada"), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_upload_stores_object_and_suggests() {
        let store = MemoryStore::default();
        let gallery = gallery(store.clone()).with_detector(Some(detector(&[
            ("Sky", 80.0),
            ("Beach", 99.0),
            ("Sand", 90.0),
            ("Water", 95.0),
            ("Person", 70.0),
            ("Boat", 60.0),
        ])));
        let user = gallery.register_user("ada").unwrap();

        let upload = gallery.upload_image(user.id, "holiday/beach.jpg", b"bytes").unwrap();
        assert_eq!(upload.suggested_tags, tags(&["Beach", "Water", "Sand", "Sky", "Person"]));
        assert!(upload.image.tags.is_empty());
        assert_eq!(upload.image.name, "beach.jpg");
        assert_eq!(upload.image.storage_key, format!("user_{}/uploads/beach.jpg", user.id));
        assert_eq!(store.keys(), vec![upload.image.storage_key.clone()]);

        let again = gallery.upload_image(user.id, "beach.jpg", b"other").unwrap();
        assert_eq!(again.image.storage_key, format!("user_{}/uploads/beach_1.jpg", user.id));
    }

    #[test]
    fn test_upload_detection_failure_leaves_nothing() {
        let store = MemoryStore::default();
        let gallery = gallery(store.clone()).with_detector(Some(Box::new(FakeDetector {
            labels: Vec::new(),
            fail: true,
        })));
        let user = gallery.register_user("ada").unwrap();

        let err = gallery.upload_image(user.id, "a.jpg", b"bytes").unwrap_err();
        assert!(matches!(err, Error::External { .. }));
        assert!(store.keys().is_empty());
        assert!(gallery.list_images(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_upload_validation() {
        let gallery = gallery(MemoryStore::default());
        let user = gallery.register_user("ada").unwrap();
        assert!(matches!(gallery.upload_image(user.id, "a.jpg", b""), Err(Error::BadRequest(_))));
        assert!(matches!(gallery.upload_image(user.id, "", b"x"), Err(Error::BadRequest(_))));
        assert!(matches!(gallery.upload_image(999, "a.jpg", b"x"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_suggest_tags_requires_detector() {
        let gallery = gallery(MemoryStore::default());
        assert!(matches!(gallery.suggest_tags(b"x"), Err(Error::Unavailable(_))));

        let gallery = gallery.with_detector(Some(detector(&[("Dog", 90.0)])));
        assert_eq!(gallery.suggest_tags(b"x").unwrap(), tags(&["Dog"]));
        assert!(matches!(gallery.suggest_tags(b""), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_edit_tags_capitalizes_and_requires_one() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);

        let edited = gallery
            .edit_tags(user.id, images[0].id, &tags(&["sUNSET", "beach", "Beach"]))
            .unwrap();
        assert_eq!(edited.tags, tags(&["Sunset", "Beach"]));

        let err = gallery.edit_tags(user.id, images[0].id, &tags(&[" ", ""])).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(gallery.image_detail(images[0].id).unwrap().tags, tags(&["Sunset", "Beach"]));
    }

    #[test]
    fn test_other_users_images_are_not_found() {
        let gallery = gallery(MemoryStore::default());
        let (_, images) = seeded(&gallery);
        let bob = gallery.register_user("bob").unwrap();

        assert!(matches!(
            gallery.rename_image(bob.id, images[0].id, "mine"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            gallery.delete_image(bob.id, images[0].id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_album_tags_add_and_evict() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Trips", None).unwrap();

        gallery.add_album_tags(user.id, album.id, &tags(&["Mountain"])).unwrap();
        assert_eq!(member_ids(&gallery, album.id), vec![images[2].id]);

        gallery.add_album_tags(user.id, album.id, &tags(&["Dog"])).unwrap();
        assert_eq!(member_ids(&gallery, album.id), vec![images[1].id, images[2].id]);

        let album = gallery.remove_album_tags(user.id, album.id, &tags(&["Mountain"])).unwrap();
        assert_eq!(album.tags, tags(&["Dog"]));
        assert_eq!(member_ids(&gallery, album.id), vec![images[1].id]);
    }

    #[test]
    fn test_manual_members_survive_tag_removal() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Pets", None).unwrap();

        gallery.add_album_tags(user.id, album.id, &tags(&["Dog"])).unwrap();
        gallery.add_images(user.id, album.id, &[images[0].id, images[1].id]).unwrap();
        gallery.remove_album_tags(user.id, album.id, &tags(&["Dog"])).unwrap();

        assert_eq!(member_ids(&gallery, album.id), vec![images[0].id, images[1].id]);
    }

    #[test]
    fn test_image_tag_change_refreshes_albums() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Dogs", None).unwrap();
        gallery.add_album_tags(user.id, album.id, &tags(&["Dog"])).unwrap();
        gallery.set_cover(user.id, album.id, images[1].id).unwrap();

        gallery.edit_tags(user.id, images[0].id, &tags(&["dog"])).unwrap();
        gallery.edit_tags(user.id, images[1].id, &tags(&["cat"])).unwrap();

        let stored = gallery.db().get_album(album.id).unwrap().unwrap();
        assert_eq!(stored.cover_image_id, None);
        assert_eq!(member_ids(&gallery, album.id), vec![images[0].id]);
    }

    #[test]
    fn test_removing_cover_image_clears_cover() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Trips", Some(images[0].id)).unwrap();
        assert_eq!(member_ids(&gallery, album.id), vec![images[0].id]);

        let album = gallery.remove_image(user.id, album.id, images[0].id).unwrap();
        assert_eq!(album.cover_image_id, None);
        assert_eq!(gallery.db().get_album(album.id).unwrap().unwrap().cover_image_id, None);

        let err = gallery.remove_image(user.id, album.id, images[0].id).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn test_cover_must_be_member() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Trips", None).unwrap();

        assert!(matches!(
            gallery.set_cover(user.id, album.id, images[0].id),
            Err(Error::BadRequest(_))
        ));

        let bob = gallery.register_user("bob").unwrap();
        assert!(matches!(
            gallery.create_album(bob.id, "Stolen", Some(images[0].id)),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_add_images_only_accepts_own() {
        let gallery = gallery(MemoryStore::default());
        let (user, images) = seeded(&gallery);
        let bob = gallery.register_user("bob").unwrap();
        let bobs_album = gallery.create_album(bob.id, "Mine", None).unwrap();

        assert!(matches!(
            gallery.add_images(bob.id, bobs_album.id, &[images[0].id]),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            gallery.add_images(bob.id, bobs_album.id, &[]),
            Err(Error::BadRequest(_))
        ));

        let album = gallery.create_album(user.id, "Mixed", None).unwrap();
        let added = gallery
            .add_images(user.id, album.id, &[images[0].id, images[0].id, 12345])
            .unwrap();
        assert_eq!(added, 1);
    }

    #[test]
    fn test_delete_image_detaches_and_tolerates_store_failure() {
        let store = MemoryStore {
            fail_deletes: true,
            ..Default::default()
        };
        let gallery = gallery(store.clone());
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Trips", Some(images[0].id)).unwrap();

        gallery.delete_image(user.id, images[0].id).unwrap();

        let view = gallery.album_view(album.id).unwrap();
        assert!(view.images.is_empty());
        assert_eq!(view.album.cover_image_id, None);
        assert!(matches!(gallery.image_detail(images[0].id), Err(Error::NotFound { .. })));
        assert_eq!(store.keys().len(), 3);
    }

    #[test]
    fn test_prompt_updates_album_tags() {
        let gallery = gallery(MemoryStore::default()).with_ranker(Some(ranker()));
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Walks", None).unwrap();

        let update = gallery
            .update_album_tags_from_prompt(user.id, album.id, "mountain walks without dog")
            .unwrap();
        assert_eq!(update.album.tags, tags(&["Mountain"]));
        assert_eq!(update.ranking.negative, tags(&["Dog"]));
        assert_eq!(member_ids(&gallery, album.id), vec![images[2].id]);
    }

    #[test]
    fn test_prompt_plural_negation_excludes_singular_label() {
        let gallery = gallery(MemoryStore::default()).with_ranker(Some(ranker()));
        let (user, images) = seeded(&gallery);
        let album = gallery.create_album(user.id, "Shore", None).unwrap();

        let update = gallery
            .update_album_tags_from_prompt(user.id, album.id, "beach with no dogs")
            .unwrap();
        assert_eq!(update.album.tags, tags(&["Beach"]));
        assert_eq!(update.ranking.negative, tags(&["Dog"]));
        assert_eq!(member_ids(&gallery, album.id), vec![images[0].id, images[2].id]);
    }

    #[test]
    fn test_prompt_without_valid_tags_changes_nothing() {
        let gallery = gallery(MemoryStore::default()).with_ranker(Some(ranker()));
        let user = gallery.register_user("ada").unwrap();
        let upload = gallery.upload_image(user.id, "cat.jpg", b"x").unwrap();
        gallery.finalize_tags(user.id, upload.image.id, &tags(&["Cat"])).unwrap();
        let album = gallery.create_album(user.id, "Cats", None).unwrap();
        gallery.add_album_tags(user.id, album.id, &tags(&["Cat"])).unwrap();

        let err = gallery
            .update_album_tags_from_prompt(user.id, album.id, "beach")
            .unwrap_err();
        assert!(matches!(err, Error::NoValidTags));

        let view = gallery.album_view(album.id).unwrap();
        assert_eq!(view.album.tags, tags(&["Cat"]));
        assert_eq!(view.images.len(), 1);

        assert!(matches!(
            gallery.update_album_tags_from_prompt(user.id, album.id, "   "),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_prompt_requires_ranker() {
        let gallery = gallery(MemoryStore::default());
        let user = gallery.register_user("ada").unwrap();
        let album = gallery.create_album(user.id, "Any", None).unwrap();
        assert!(matches!(
            gallery.update_album_tags_from_prompt(user.id, album.id, "beach"),
            Err(Error::Unavailable(_))
        ));
    }

    #[test]
    fn test_explore_and_search() {
        let gallery = gallery(MemoryStore::default());
        let (ada, _) = seeded(&gallery);
        let bob = gallery.register_user("Bobby").unwrap();
        gallery.create_album(ada.id, "Summer Trips", None).unwrap();

        assert_eq!(gallery.explore_images(bob.id, Some("bEaCh")).unwrap().len(), 2);
        assert_eq!(gallery.explore_images(bob.id, None).unwrap().len(), 3);
        assert!(gallery.explore_images(ada.id, None).unwrap().is_empty());
        assert_eq!(gallery.explore_albums(bob.id, Some("trip")).unwrap().len(), 1);
        assert!(gallery.explore_albums(bob.id, Some("winter")).unwrap().is_empty());

        let found: Vec<String> = gallery
            .search_users("bob")
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(found, vec!["Bobby"]);
    }

    #[test]
    fn test_user_tags_and_analytics() {
        let gallery = gallery(MemoryStore::default());
        let (user, _) = seeded(&gallery);

        assert_eq!(gallery.user_tags(user.id).unwrap(), tags(&["Beach", "Dog", "Mountain"]));
        let analytics = gallery.analytics(user.id).unwrap();
        assert_eq!(analytics.total_images, 3);
        assert_eq!(analytics.top_tags[0], ("Beach".to_string(), 2));
    }

    #[test]
    fn test_profile_and_delete_account() {
        let store = MemoryStore::default();
        let gallery = gallery(store.clone());
        let (user, _) = seeded(&gallery);
        gallery.create_album(user.id, "Trips", None).unwrap();

        let profile = gallery.profile("ada").unwrap();
        assert_eq!(profile.image_count, 3);
        assert_eq!(profile.album_count, 1);

        gallery.delete_account(user.id).unwrap();
        assert!(store.keys().is_empty());
        assert!(matches!(gallery.profile("ada"), Err(Error::NotFound { .. })));
        assert!(matches!(gallery.delete_account(user.id), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_accept_suggestions_returns_finalized_image() {
        let gallery = gallery(MemoryStore::default())
            .with_detector(Some(detector(&[("Beach", 99.0), ("Sky", 80.0)])));
        let user = gallery.register_user("ada").unwrap();

        let upload = gallery.upload_image(user.id, "beach.jpg", b"bytes").unwrap();
        assert!(upload.image.tags.is_empty());
        let accepted = gallery.accept_suggestions(upload).unwrap();
        assert_eq!(accepted.image.tags, tags(&["Beach", "Sky"]));
        assert_eq!(accepted.suggested_tags, tags(&["Beach", "Sky"]));
        assert_eq!(gallery.image_detail(accepted.image.id).unwrap().tags, tags(&["Beach", "Sky"]));
    }

    #[test]
    fn test_user_images_and_albums() {
        let gallery = gallery(MemoryStore::default());
        let (ada, images) = seeded(&gallery);
        let bob = gallery.register_user("bob").unwrap();

        let listed: Vec<ImageId> = gallery.user_images(ada.id).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(listed.len(), images.len());
        assert!(images.iter().all(|i| listed.contains(&i.id)));

        assert!(matches!(gallery.user_albums(ada.id), Err(Error::NotFound { .. })));
        let album = gallery.create_album(ada.id, "Trips", None).unwrap();
        let albums = gallery.user_albums(ada.id).unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].id, album.id);

        assert!(matches!(gallery.user_images(bob.id), Err(Error::NotFound { .. })));
        assert!(matches!(gallery.user_images(9999), Err(Error::NotFound { .. })));
        assert!(matches!(gallery.user_albums(9999), Err(Error::NotFound { .. })));
    }
}
