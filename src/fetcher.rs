use tracing::{info, instrument, warn};

use crate::model::{ContentDetail, ContentType, RemoteListItem};
use crate::substack::{fetch_detail, ContentApi, Site};

/// Outcome of fetching a change-set: the items that resolved, plus the ids
/// that did not.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: Vec<ContentDetail>,
    pub failed: Vec<i64>,
}

/// Fetch details for every change-set item, one request chain at a time.
///
/// A failed item is logged and skipped; it never aborts the remaining items.
#[instrument(skip_all, fields(content_type = %content_type, items = change_set.len()))]
pub async fn fetch_content(
    api: &dyn ContentApi,
    site: &Site,
    content_type: ContentType,
    change_set: &[RemoteListItem],
) -> FetchReport {
    let mut report = FetchReport::default();
    for item in change_set {
        match fetch_detail(api, site, content_type, item).await {
            Ok(detail) => report.fetched.push(detail),
            Err(err) => {
                warn!(%err, id = item.id, "failed to fetch item, skipping");
                report.failed.push(item.id);
            }
        }
    }
    info!(
        fetched = report.fetched.len(),
        failed = report.failed.len(),
        "fetched change-set"
    );
    report
}
