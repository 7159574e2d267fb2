//! Album membership reconciliation.
//!
//! An album's member set is a cache derived from two inputs: images the user
//! pinned manually, and images whose tags overlap the album's tags. The
//! result is always `manual ∪ matched`; tag changes can add images or evict
//! previously tag-matched ones, but never evict a manual member.

use std::collections::{BTreeSet, HashSet};

use crate::models::{Image, ImageId, Membership, MembershipSource};

/// Whether `image_tags` shares at least one tag with `album_tags`.
pub fn overlaps(image_tags: &[String], album_tags: &HashSet<&str>) -> bool {
    image_tags.iter().any(|t| album_tags.contains(t.as_str()))
}

/// Ids of every candidate with at least one tag in `album_tags`.
pub fn matched(album_tags: &[String], candidates: &[Image]) -> BTreeSet<ImageId> {
    if album_tags.is_empty() {
        return BTreeSet::new();
    }
    let album_tags: HashSet<&str> = album_tags.iter().map(String::as_str).collect();
    candidates
        .iter()
        .filter(|img| overlaps(&img.tags, &album_tags))
        .map(|img| img.id)
        .collect()
}

/// The album's member set: manual additions plus every tag match.
pub fn reconcile(
    album_tags: &[String],
    candidates: &[Image],
    manually_added: &BTreeSet<ImageId>,
) -> BTreeSet<ImageId> {
    let mut members = matched(album_tags, candidates);
    members.extend(manually_added.iter().copied());
    members
}

/// Row-level changes that bring stored membership in line with [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipPlan {
    /// Newly matched images, to insert with [`MembershipSource::Tag`].
    pub to_add: Vec<ImageId>,
    /// Tag-derived members that no longer match any album tag.
    pub to_evict: Vec<ImageId>,
    /// The cover would point outside the resulting member set.
    pub clear_cover: bool,
}

impl MembershipPlan {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_evict.is_empty() && !self.clear_cover
    }
}

/// Compute the changes needed for `current` to equal
/// `reconcile(album_tags, candidates, manual members of current)`.
pub fn plan(
    album_tags: &[String],
    candidates: &[Image],
    current: &[Membership],
    cover: Option<ImageId>,
) -> MembershipPlan {
    let matched = matched(album_tags, candidates);

    let manual: BTreeSet<ImageId> = current
        .iter()
        .filter(|m| m.source == MembershipSource::Manual)
        .map(|m| m.image_id)
        .collect();
    let tagged: BTreeSet<ImageId> = current
        .iter()
        .filter(|m| m.source == MembershipSource::Tag)
        .map(|m| m.image_id)
        .collect();

    let to_add: Vec<ImageId> = matched
        .iter()
        .filter(|id| !manual.contains(id) && !tagged.contains(id))
        .copied()
        .collect();

    let to_evict: Vec<ImageId> = tagged
        .iter()
        .filter(|id| !matched.contains(id) && !manual.contains(id))
        .copied()
        .collect();

    let clear_cover = match cover {
        Some(id) => !(manual.contains(&id) || matched.contains(&id)),
        None => false,
    };

    MembershipPlan {
        to_add,
        to_evict,
        clear_cover,
    }
}
