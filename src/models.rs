//! Persisted entities: users, images and albums.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub type UserId = i64;
pub type ImageId = i64;
pub type AlbumId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// An uploaded image and its tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: ImageId,
    pub owner_id: UserId,
    /// Object store key, e.g. `user_3/uploads/beach.jpg`.
    pub storage_key: String,
    pub name: String,
    /// Deduplicated; order is kept only for display.
    pub tags: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// An album. Its member set lives in `album_images` and is a derived cache,
/// see [`crate::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Album {
    pub id: AlbumId,
    pub owner_id: UserId,
    pub name: String,
    pub tags: Vec<String>,
    pub cover_image_id: Option<ImageId>,
    pub created_at: DateTime<Utc>,
}

/// How an image came to be in an album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipSource {
    /// Added by explicit user action; never evicted by tag changes.
    Manual,
    /// Added because one of its tags matched the album's tags.
    Tag,
}

impl MembershipSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipSource::Manual => "manual",
            MembershipSource::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(MembershipSource::Manual),
            "tag" => Some(MembershipSource::Tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub image_id: ImageId,
    pub source: MembershipSource,
}

/// An album together with its current members.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumView {
    pub album: Album,
    pub owner_username: String,
    pub images: Vec<Image>,
}

/// A user with a few counters for the profile page.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub image_count: i64,
    pub album_count: i64,
}

