use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub podcast_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub audio_url: String,
    pub guid: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub duration_formatted: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Canonical episode record produced by the item normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEpisode {
    pub title: String,
    pub description: Option<String>,
    pub audio_url: String,
    pub guid: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub duration_formatted: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// An episode as seen by one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserEpisode {
    pub episode: Episode,
    pub podcast_title: String,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpisodeOrder {
    #[default]
    Newest,
    Oldest,
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeFilter {
    pub podcast_id: Option<i64>,
    pub hide_completed: bool,
    pub order: EpisodeOrder,
}
