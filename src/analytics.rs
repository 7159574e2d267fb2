//! Tag usage statistics over a user's images.

use serde::Serialize;
use std::collections::HashMap;

use crate::models::Image;

pub const TOP_TAGS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagAnalytics {
    pub total_images: usize,
    /// Most used tags, highest count first. Ties keep first-seen order.
    pub top_tags: Vec<(String, usize)>,
    /// Every distinct tag with its count, in first-seen order.
    pub distribution: Vec<(String, usize)>,
}

pub fn aggregate(images: &[Image]) -> TagAnalytics {
    let mut distribution: Vec<(String, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for image in images {
        for tag in &image.tags {
            match positions.get(tag.as_str()) {
                Some(&pos) => distribution[pos].1 += 1,
                None => {
                    positions.insert(tag.as_str(), distribution.len());
                    distribution.push((tag.clone(), 1));
                }
            }
        }
    }

    let mut top_tags = distribution.clone();
    top_tags.sort_by(|a, b| b.1.cmp(&a.1));
    top_tags.truncate(TOP_TAGS);

    TagAnalytics {
        total_images: images.len(),
        top_tags,
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(id: i64, tags: &[&str]) -> Image {
        Image {
            id,
            owner_id: 1,
            storage_key: format!("user_1/uploads/{}.jpg", id),
            name: format!("{}.jpg", id),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            uploaded_at: Utc::now(),
        }
    }

    fn count(analytics: &TagAnalytics, tag: &str) -> Option<usize> {
        analytics
            .distribution
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, c)| *c)
    }

    #[test]
    fn test_aggregate_counts() {
        let images = vec![image(1, &["A", "B"]), image(2, &["B", "C"]), image(3, &["B"])];
        let analytics = aggregate(&images);

        assert_eq!(analytics.total_images, 3);
        assert_eq!(analytics.top_tags[0], ("B".to_string(), 3));
        assert_eq!(count(&analytics, "A"), Some(1));
        assert_eq!(count(&analytics, "B"), Some(3));
        assert_eq!(count(&analytics, "C"), Some(1));
        assert_eq!(analytics.distribution.len(), 3);
    }

    #[test]
    fn test_top_tags_truncated_and_ties_stable() {
        let images = vec![
            image(1, &["F", "E", "D", "C", "B", "A"]),
            image(2, &["A"]),
        ];
        let analytics = aggregate(&images);
        let top: Vec<&str> = analytics.top_tags.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(top, vec!["A", "F", "E", "D", "C"]);
    }

    #[test]
    fn test_aggregate_empty() {
        let analytics = aggregate(&[]);
        assert_eq!(analytics, TagAnalytics::default());
    }
}
