use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{ContentType, IndexEntry, RemoteListItem};
use crate::substack::{ContentApi, Site};

/// Walk the listing one page at a time until the remote returns an empty page.
#[instrument(skip_all, fields(content_type = %content_type))]
pub async fn collect_listing(
    api: &dyn ContentApi,
    site: &Site,
    content_type: ContentType,
    page_size: usize,
) -> Result<Vec<RemoteListItem>> {
    let mut listing = Vec::new();
    let mut offset = 0;
    loop {
        let page = api.list_page(site, content_type, offset, page_size).await?;
        if page.is_empty() {
            break;
        }
        debug!(offset, items = page.len(), "listing page");
        offset += page_size;
        listing.extend(page);
    }
    Ok(listing)
}

/// Pick the listed items that need their detail fetched this cycle.
///
/// An item is selected when it is not cached, when its listing timestamp is
/// strictly newer than the cached one, or when `force` is set. Items without a
/// listing timestamp, or whose cached entry has none, are always selected.
pub fn resolve_change_set(
    listing: &[RemoteListItem],
    cached: &[IndexEntry],
    force: bool,
) -> Vec<RemoteListItem> {
    if force {
        return listing.to_vec();
    }
    let by_id: HashMap<i64, &IndexEntry> = cached.iter().map(|e| (e.id, e)).collect();
    listing
        .iter()
        .filter(|item| match by_id.get(&item.id) {
            None => true,
            Some(entry) => match (item.updated_at, entry.updated_at) {
                (Some(listed), Some(known)) => listed > known,
                _ => true,
            },
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn listed(id: i64, updated: Option<DateTime<Utc>>) -> RemoteListItem {
        RemoteListItem {
            id,
            updated_at: updated,
            slug: None,
            cover_image: None,
            post_date: None,
        }
    }

    fn cached(id: i64, updated: Option<DateTime<Utc>>) -> IndexEntry {
        IndexEntry {
            id,
            title: format!("Item {}", id),
            slug: None,
            file_name: format!("item_{}_{}.json", id, id),
            updated_at: updated,
            published_at: None,
            cover_image: None,
        }
    }

    fn ids(items: &[RemoteListItem]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn selects_new_and_strictly_newer_items() {
        let listing = vec![
            listed(1, Some(at(10))),
            listed(2, Some(at(9))),
            listed(3, Some(at(8))),
        ];
        let cache = vec![cached(1, Some(at(9))), cached(2, Some(at(9)))];
        assert_eq!(ids(&resolve_change_set(&listing, &cache, false)), vec![1, 3]);
    }

    #[test]
    fn older_listing_timestamp_is_not_selected() {
        let listing = vec![listed(1, Some(at(7)))];
        let cache = vec![cached(1, Some(at(9)))];
        assert!(resolve_change_set(&listing, &cache, false).is_empty());
    }

    #[test]
    fn compares_instants_not_strings() {
        // "10:00+02:00" sorts after "09:00Z" as text but is the earlier instant.
        let earlier = DateTime::parse_from_rfc3339("2024-06-01T10:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let listing = vec![listed(1, Some(earlier))];
        let cache = vec![cached(1, Some(later))];
        assert!(resolve_change_set(&listing, &cache, false).is_empty());
    }

    #[test]
    fn missing_timestamps_force_a_refetch() {
        let listing = vec![listed(1, None), listed(2, Some(at(5)))];
        let cache = vec![cached(1, Some(at(9))), cached(2, None)];
        assert_eq!(ids(&resolve_change_set(&listing, &cache, false)), vec![1, 2]);
    }

    #[test]
    fn force_selects_everything() {
        let listing: Vec<_> = (1..=10).map(|id| listed(id, Some(at(1)))).collect();
        let cache: Vec<_> = (1..=10).map(|id| cached(id, Some(at(1)))).collect();
        assert!(resolve_change_set(&listing, &cache, false).is_empty());
        assert_eq!(resolve_change_set(&listing, &cache, true).len(), 10);
    }

    #[test]
    fn empty_listing_yields_empty_change_set() {
        let cache = vec![cached(1, Some(at(1)))];
        assert!(resolve_change_set(&[], &cache, true).is_empty());
    }
}
