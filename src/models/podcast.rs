use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NewEpisode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Podcast {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub feed_url: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub website_url: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

/// Podcast-level fields read from a feed document. Empty values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub website_url: Option<String>,
}

/// A fully normalized feed, ready for reconciliation.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub metadata: FeedMetadata,
    pub episodes: Vec<NewEpisode>,
}
