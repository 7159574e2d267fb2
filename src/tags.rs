//! Tag list normalization.
//!
//! Tags are free-form strings compared case-sensitively. Stored lists are
//! deduplicated but otherwise kept as given; manual edits additionally
//! capitalize each tag.

use std::collections::HashSet;

/// Trim, drop empty entries and deduplicate, keeping first occurrences in order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.to_string()) {
            out.push(tag.to_string());
        }
    }
    out
}

/// First character upper-case, the rest lower-case: `"sUNSET beach"` -> `"Sunset beach"`.
pub fn capitalize_tag(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Normalization applied to manual tag edits.
pub fn capitalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    normalize_tags(
        tags.into_iter()
            .map(|t| capitalize_tag(t.as_ref().trim())),
    )
}

/// Append `extra` to `base`, skipping anything already present.
pub fn union_tags(base: &[String], extra: &[String]) -> Vec<String> {
    normalize_tags(base.iter().chain(extra.iter()))
}

/// `base` without any tag listed in `remove`.
pub fn difference_tags(base: &[String], remove: &[String]) -> Vec<String> {
    let remove: HashSet<&str> = remove.iter().map(|t| t.trim()).collect();
    base.iter()
        .filter(|t| !remove.contains(t.as_str()))
        .cloned()
        .collect()
}
