use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, Instrument};
use uuid::Uuid;

use crate::archive::ArchiveWriter;
use crate::error::{BackupError, Result};
use crate::fetcher::fetch_content;
use crate::merge::merge_index;
use crate::model::{BackupResult, ContentDetail, ContentType, IndexEntry};
use crate::resolver::{collect_listing, resolve_change_set};
use crate::status::ResultStore;
use crate::store::SettingsStore;
use crate::substack::{ContentApi, Site};

/// Answer to a trigger; the cycle itself keeps running in the background.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TriggerAck {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CycleOutcome {
    item_count: usize,
    message: Option<String>,
}

impl CycleOutcome {
    fn nothing_new(content_type: ContentType) -> Self {
        Self {
            item_count: 0,
            message: Some(format!("No new or updated {} to back up", content_type.noun())),
        }
    }
}

/// Runs backup cycles for both content types against one publication.
pub struct BackupOrchestrator {
    api: Arc<dyn ContentApi>,
    store: SettingsStore,
    writer: ArchiveWriter,
    results: Arc<ResultStore>,
    page_size: usize,
}

impl BackupOrchestrator {
    pub fn new(
        api: Arc<dyn ContentApi>,
        store: SettingsStore,
        writer: ArchiveWriter,
        results: Arc<ResultStore>,
        page_size: usize,
    ) -> Self {
        Self {
            api,
            store,
            writer,
            results,
            page_size: page_size.max(1),
        }
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// Start a cycle without waiting for it.
    pub fn trigger(self: &Arc<Self>, content_type: ContentType, force: bool) -> TriggerAck {
        if !self.results.try_begin(content_type) {
            info!(%content_type, "backup already running, trigger ignored");
            return TriggerAck::AlreadyRunning;
        }
        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                this.run_cycle(content_type, force).await;
            }
            .in_current_span(),
        );
        TriggerAck::Started
    }

    /// Run a cycle to completion. `None` if one of this type is already running.
    pub async fn run_now(&self, content_type: ContentType, force: bool) -> Option<BackupResult> {
        if !self.results.try_begin(content_type) {
            return None;
        }
        Some(self.run_cycle(content_type, force).await)
    }

    #[instrument(skip(self), fields(cycle = %Uuid::new_v4()))]
    async fn run_cycle(&self, content_type: ContentType, force: bool) -> BackupResult {
        let started = Instant::now();
        info!("backup cycle started");
        match self.execute(content_type, force).await {
            Ok(outcome) => {
                let seconds = (started.elapsed().as_secs_f64() * 10.0).round() / 10.0;
                info!(items = outcome.item_count, seconds, "backup cycle succeeded");
                self.results
                    .finish_success(content_type, outcome.item_count, seconds, outcome.message);
            }
            Err(err) => {
                error!(%err, "backup cycle failed");
                self.results.finish_failure(content_type, err.to_string());
            }
        }
        self.results.get(content_type)
    }

    async fn execute(&self, content_type: ContentType, force: bool) -> Result<CycleOutcome> {
        let settings = self.store.load_settings().await?;
        let dir = settings
            .directory_for(content_type)
            .ok_or_else(|| {
                BackupError::Configuration(format!(
                    "no backup directory configured for {}",
                    content_type.noun()
                ))
            })?
            .to_string();
        let site = Site::from_host(settings.substack_url.as_deref().unwrap_or_default())?;

        let listing = collect_listing(self.api.as_ref(), &site, content_type, self.page_size).await?;
        let cached = self.store.load_index(content_type).await?;
        let change_set = resolve_change_set(&listing, &cached, force);
        info!(
            listed = listing.len(),
            cached = cached.len(),
            selected = change_set.len(),
            force,
            "resolved change-set"
        );
        if change_set.is_empty() {
            return Ok(CycleOutcome::nothing_new(content_type));
        }

        let report = fetch_content(self.api.as_ref(), &site, content_type, &change_set).await;
        if report.fetched.is_empty() {
            return Ok(CycleOutcome::nothing_new(content_type));
        }

        let item_count = report.fetched.len();
        self.writer.open_session().await;
        let archived = self
            .archive(&dir, content_type, report.fetched, &cached)
            .await;
        self.writer.close_session().await;

        let Some(merged) = archived? else {
            return Ok(CycleOutcome {
                item_count,
                message: Some(format!("No {} could be written", content_type.noun())),
            });
        };
        self.store.replace_index(content_type, &merged).await?;
        Ok(CycleOutcome {
            item_count,
            message: None,
        })
    }

    /// Write item files, then the merged index. Items whose file write failed
    /// stay out of the merge so their cached entry is kept as is; items with no
    /// body are indexed without a file.
    async fn archive(
        &self,
        dir: &str,
        content_type: ContentType,
        fetched: Vec<ContentDetail>,
        cached: &[IndexEntry],
    ) -> Result<Option<Vec<IndexEntry>>> {
        let report = self.writer.write_items(dir, content_type, &fetched).await;
        let failed: HashSet<i64> = report.failed_ids();
        let archived: Vec<ContentDetail> = fetched
            .into_iter()
            .filter(|d| !failed.contains(&d.id))
            .collect();
        if archived.is_empty() {
            return Ok(None);
        }

        let merged = merge_index(content_type, &archived, cached);
        self.writer.write_index(dir, &merged).await?;
        Ok(Some(merged))
    }
}
