use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::model::{BackupResult, ContentType, LastResult};

/// Result records for both content types, as returned to status queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllResults {
    pub drafts: BackupResult,
    pub published: BackupResult,
}

/// Process-wide backup status, one record per content type.
///
/// Starts idle on every process start. `try_begin` is the only way into the
/// running state and refuses while a cycle of the same type is in flight.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: Mutex<HashMap<ContentType, BackupResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContentType, BackupResult>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, content_type: ContentType) -> BackupResult {
        self.lock().get(&content_type).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> AllResults {
        let guard = self.lock();
        AllResults {
            drafts: guard.get(&ContentType::Drafts).cloned().unwrap_or_default(),
            published: guard
                .get(&ContentType::Published)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn in_progress(&self, content_type: ContentType) -> bool {
        self.get(content_type).in_progress
    }

    /// Mark a cycle as started. Returns `false` if one is already running.
    pub fn try_begin(&self, content_type: ContentType) -> bool {
        let mut guard = self.lock();
        let record = guard.entry(content_type).or_default();
        if record.in_progress {
            return false;
        }
        record.in_progress = true;
        record.last_result = None;
        true
    }

    pub fn finish_success(
        &self,
        content_type: ContentType,
        item_count: usize,
        duration: f64,
        message: Option<String>,
    ) {
        let mut guard = self.lock();
        let record = guard.entry(content_type).or_default();
        record.in_progress = false;
        record.last_result = Some(LastResult::Success);
        record.last_time = Some(Utc::now());
        record.item_count = item_count;
        record.duration = duration;
        record.error = None;
        record.message = message;
    }

    pub fn finish_failure(&self, content_type: ContentType, error: String) {
        let mut guard = self.lock();
        let record = guard.entry(content_type).or_default();
        record.in_progress = false;
        record.last_result = Some(LastResult::Error);
        record.last_time = Some(Utc::now());
        record.item_count = 0;
        record.duration = 0.0;
        record.error = Some(error);
        record.message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_single_flight_per_content_type() {
        let store = ResultStore::new();
        assert!(store.try_begin(ContentType::Drafts));
        assert!(!store.try_begin(ContentType::Drafts));
        assert!(store.try_begin(ContentType::Published));

        store.finish_success(ContentType::Drafts, 4, 1.5, None);
        assert!(store.try_begin(ContentType::Drafts));
    }

    #[test]
    fn begin_clears_last_result_but_keeps_history() {
        let store = ResultStore::new();
        assert!(store.try_begin(ContentType::Drafts));
        store.finish_success(ContentType::Drafts, 2, 0.3, None);
        let finished_at = store.get(ContentType::Drafts).last_time;

        assert!(store.try_begin(ContentType::Drafts));
        let running = store.get(ContentType::Drafts);
        assert!(running.in_progress);
        assert_eq!(running.last_result, None);
        assert_eq!(running.last_time, finished_at);
    }

    #[test]
    fn failure_resets_counts_and_records_error() {
        let store = ResultStore::new();
        assert!(store.try_begin(ContentType::Published));
        store.finish_failure(ContentType::Published, "boom".into());

        let result = store.get(ContentType::Published);
        assert!(!result.in_progress);
        assert_eq!(result.last_result, Some(LastResult::Error));
        assert_eq!(result.item_count, 0);
        assert_eq!(result.duration, 0.0);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.last_time.is_some());
    }

    #[test]
    fn snapshot_reports_idle_types_as_default() {
        let store = ResultStore::new();
        assert!(store.try_begin(ContentType::Drafts));
        let all = store.snapshot();
        assert!(all.drafts.in_progress);
        assert_eq!(all.published, BackupResult::default());
    }
}
