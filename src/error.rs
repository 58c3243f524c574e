use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to fetch feed {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse feed: {0}")]
    Parse(String),

    #[error("User {user_id} is not subscribed to podcast {podcast_id}")]
    Unauthorized { user_id: i64, podcast_id: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        AppError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
