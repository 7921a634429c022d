//! Durable configuration record backed by SQLite.
//!
//! Keys mirror the settings form: `substackUrl`, `downloadDir`, `publishedDir`,
//! plus the cached indices `draftsIndex` and `publishedIndex`. Every value is
//! stored as JSON text.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{instrument, warn};

use crate::error::{BackupError, Result};
use crate::model::{ContentType, IndexEntry};

pub const KEY_SUBSTACK_URL: &str = "substackUrl";
pub const KEY_DOWNLOAD_DIR: &str = "downloadDir";
pub const KEY_PUBLISHED_DIR: &str = "publishedDir";

pub fn index_key(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Drafts => "draftsIndex",
        ContentType::Published => "publishedIndex",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub substack_url: Option<String>,
    pub download_dir: Option<String>,
    pub published_dir: Option<String>,
}

impl Settings {
    /// Destination directory for a content type, if one is configured.
    pub fn directory_for(&self, content_type: ContentType) -> Option<&str> {
        let dir = match content_type {
            ContentType::Drafts => self.download_dir.as_deref(),
            ContentType::Published => self.published_dir.as_deref(),
        };
        dir.map(str::trim).filter(|d| !d.is_empty())
    }

    /// Keys that still need a value before every backup can run.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self
            .substack_url
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
        {
            missing.push(KEY_SUBSTACK_URL);
        }
        if self.directory_for(ContentType::Drafts).is_none() {
            missing.push(KEY_DOWNLOAD_DIR);
        }
        if self.directory_for(ContentType::Published).is_none() {
            missing.push(KEY_PUBLISHED_DIR);
        }
        missing
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let normalized = prepare_sqlite_url(database_url);
        let options = SqliteConnectOptions::from_str(&normalized)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database. One connection, so every query sees it.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip_all)]
    pub async fn load_settings(&self) -> Result<Settings> {
        Ok(Settings {
            substack_url: self.get(KEY_SUBSTACK_URL).await?,
            download_dir: self.get(KEY_DOWNLOAD_DIR).await?,
            published_dir: self.get(KEY_PUBLISHED_DIR).await?,
        })
    }

    /// Store every field of `update` that is set; unset fields keep their value.
    #[instrument(skip_all)]
    pub async fn update_settings(&self, update: &Settings) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in [
            (KEY_SUBSTACK_URL, &update.substack_url),
            (KEY_DOWNLOAD_DIR, &update.download_dir),
            (KEY_PUBLISHED_DIR, &update.published_dir),
        ] {
            if let Some(value) = value {
                upsert(&mut *tx, key, &encode(value)?).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Cached index for a content type; empty when nothing was stored yet.
    ///
    /// An unreadable cache is logged and treated as empty, which makes the next
    /// cycle re-fetch everything and rewrite a clean index.
    #[instrument(skip_all, fields(content_type = %content_type))]
    pub async fn load_index(&self, content_type: ContentType) -> Result<Vec<IndexEntry>> {
        let key = index_key(content_type);
        match self.get::<Vec<IndexEntry>>(key).await {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(BackupError::Decode(err)) => {
                warn!(%err, key, "cached index unreadable, starting from empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Replace the whole cached index in one write.
    #[instrument(skip_all, fields(content_type = %content_type, entries = entries.len()))]
    pub async fn replace_index(
        &self,
        content_type: ContentType,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let value = encode(&entries)?;
        let mut tx = self.pool.begin().await?;
        upsert(&mut *tx, index_key(content_type), &value).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        raw.map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|err| BackupError::Decode(format!("setting {}: {}", key, err)))
        })
        .transpose()
    }
}

async fn upsert(conn: &mut sqlx::SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|err| BackupError::Storage(err.to_string()))
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}
