use thiserror::Error;

/// Failures of a backup cycle and its collaborators.
///
/// `Configuration`, and `Network`/`Http` during listing, end the cycle. `Http`
/// during a detail fetch and `MalformedBody` while writing only skip one item.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("published item {0} has no slug")]
    MissingSlug(i64),

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("malformed body for item {id}: {source}")]
    MalformedBody {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackupError::Decode(err.to_string())
        } else {
            BackupError::Network(err.to_string())
        }
    }
}

impl From<sqlx::Error> for BackupError {
    fn from(err: sqlx::Error) -> Self {
        BackupError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for BackupError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        BackupError::Storage(err.to_string())
    }
}

pub type Result<T, E = BackupError> = std::result::Result<T, E>;
