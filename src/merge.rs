use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::archive::derive_file_name;
use crate::model::{ContentDetail, ContentType, IndexEntry, UNTITLED};

pub fn to_index_entry(content_type: ContentType, detail: &ContentDetail) -> IndexEntry {
    let published_at = match content_type {
        ContentType::Drafts => None,
        ContentType::Published => detail.published_at,
    };
    let cover_image = match content_type {
        ContentType::Drafts => None,
        ContentType::Published => detail.cover_image.clone(),
    };
    IndexEntry {
        id: detail.id,
        title: detail
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string()),
        slug: detail.slug.clone(),
        file_name: derive_file_name(
            detail.title.as_deref(),
            detail.id,
            content_type,
            detail.published_at,
        ),
        updated_at: detail.updated_at,
        published_at,
        cover_image,
    }
}

/// Combine this cycle's fetched items with the previous index.
///
/// Fetched items win over cached entries with the same id; cached entries that
/// were not fetched are carried forward untouched. The result holds one entry
/// per id, newest first.
pub fn merge_index(
    content_type: ContentType,
    fetched: &[ContentDetail],
    cached: &[IndexEntry],
) -> Vec<IndexEntry> {
    let mut seen = HashSet::new();
    let mut merged: Vec<IndexEntry> = fetched
        .iter()
        .filter(|d| seen.insert(d.id))
        .map(|d| to_index_entry(content_type, d))
        .collect();

    for entry in cached {
        if seen.insert(entry.id) {
            merged.push(entry.clone());
        }
    }

    sort_index(content_type, &mut merged);
    merged
}

/// Drafts by `updatedAt`, published posts by `publishedAt`, newest first and
/// undated last. The sort is stable.
pub fn sort_index(content_type: ContentType, entries: &mut [IndexEntry]) {
    entries.sort_by(|a, b| newest_first(sort_key(content_type, a), sort_key(content_type, b)));
}

fn sort_key(content_type: ContentType, entry: &IndexEntry) -> Option<DateTime<Utc>> {
    match content_type {
        ContentType::Drafts => entry.updated_at,
        ContentType::Published => entry.published_at,
    }
}

fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub count: usize,
    pub most_recent: Option<DateTime<Utc>>,
}

/// Size of a cached index and its most recent change.
pub fn index_stats(entries: &[IndexEntry]) -> IndexStats {
    IndexStats {
        count: entries.len(),
        most_recent: entries
            .iter()
            .filter_map(|e| e.updated_at.or(e.published_at))
            .max(),
    }
}
