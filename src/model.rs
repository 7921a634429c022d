use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder title stored in the index when the remote item has none.
pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Drafts,
    Published,
}

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Drafts, ContentType::Published];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Drafts => "drafts",
            ContentType::Published => "published",
        }
    }

    /// Human label used in log lines and informational messages.
    pub fn noun(&self) -> &'static str {
        match self {
            ContentType::Drafts => "drafts",
            ContentType::Published => "published posts",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drafts" | "draft" => Ok(ContentType::Drafts),
            "published" | "posts" => Ok(ContentType::Published),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// One row of a paged listing. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListItem {
    pub id: i64,
    pub updated_at: Option<DateTime<Utc>>,
    pub slug: Option<String>,
    pub cover_image: Option<String>,
    pub post_date: Option<DateTime<Utc>>,
}

/// Full record resolved by the fetcher for one change-set item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDetail {
    pub id: i64,
    pub title: Option<String>,
    /// Serialized document; expected to be valid JSON but not checked until write.
    pub body: Option<String>,
    pub slug: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
}

/// One row of the persisted index (`index.json` and the cached copy).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub file_name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LastResult {
    Success,
    Error,
}

/// Status of the most recent cycle for one content type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    pub in_progress: bool,
    pub last_result: Option<LastResult>,
    pub last_time: Option<DateTime<Utc>>,
    pub item_count: usize,
    /// Wall-clock seconds of the last cycle.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Parse a remote timestamp, treating anything unparseable as absent.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
