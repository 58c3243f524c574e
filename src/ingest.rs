//! Feed ingestion: adding, refreshing and removing podcasts.
//!
//! Every operation takes the acting user explicitly. Feeds are fetched and
//! parsed in full before anything is written, and each write happens in a
//! single transaction, so a failing feed leaves the store untouched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use url::Url;

use crate::db::{RefreshOutcome, Repository};
use crate::error::{AppError, Result};
use crate::feed::{fetch_and_parse, FeedSource};
use crate::models::Podcast;

/// Totals for one pass over the podcasts due for refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub new_episodes: usize,
}

pub struct Ingestor<S> {
    repository: Repository,
    source: S,
    max_concurrent: usize,
    feed_timeout: Duration,
}

impl<S: FeedSource> Ingestor<S> {
    pub fn new(repository: Repository, source: S) -> Self {
        Self {
            repository,
            source,
            max_concurrent: 5,
            feed_timeout: Duration::from_secs(60),
        }
    }

    /// Bound concurrent fetches and the time spent on any single feed
    /// during [`Ingestor::refresh_due`].
    pub fn with_limits(mut self, max_concurrent: usize, feed_timeout: Duration) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self.feed_timeout = feed_timeout;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Subscribe `user_id` to the feed at `feed_url`, creating the podcast on
    /// first sight of the URL.
    pub async fn add_podcast(&self, feed_url: &str, user_id: i64) -> Result<Podcast> {
        let feed_url = validate_feed_url(feed_url)?;
        let parsed = fetch_and_parse(&self.source, &feed_url).await?;

        let podcast = match self.repository.find_podcast_by_feed_url(&feed_url).await? {
            Some(existing) => {
                tracing::debug!("Feed {} already stored as podcast {}", feed_url, existing.id);
                existing
            }
            None => {
                let (podcast, inserted) = self
                    .repository
                    .create_podcast_with_episodes(&feed_url, parsed, Utc::now())
                    .await?;
                tracing::info!(
                    podcast_id = podcast.id,
                    episodes = inserted,
                    "Created podcast {}",
                    podcast.title
                );
                podcast
            }
        };

        self.repository
            .subscribe(user_id, podcast.id, Utc::now())
            .await?;

        Ok(podcast)
    }

    /// Re-read a subscribed podcast's feed. Returns the number of new episodes.
    pub async fn refresh_podcast(&self, podcast_id: i64, user_id: i64) -> Result<usize> {
        if !self.repository.is_subscribed(user_id, podcast_id).await? {
            return Err(AppError::Unauthorized {
                user_id,
                podcast_id,
            });
        }

        let podcast = self
            .repository
            .get_podcast(podcast_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Podcast {}", podcast_id)))?;

        let outcome = self.refresh_feed(&podcast, None).await?;
        Ok(outcome.new_episodes)
    }

    /// Drop the user's subscription. Returns true when the podcast lost its
    /// last subscriber and was deleted along with its episodes.
    pub async fn remove_subscription(&self, podcast_id: i64, user_id: i64) -> Result<bool> {
        let deleted = self.repository.unsubscribe(user_id, podcast_id).await?;
        if deleted {
            tracing::info!(podcast_id, "Deleted podcast without subscribers");
        }
        Ok(deleted)
    }

    /// Refresh every podcast last refreshed before `cutoff`.
    ///
    /// Feeds are fetched concurrently; a failing feed is logged and counted
    /// without affecting the others.
    pub async fn refresh_due(&self, cutoff: DateTime<Utc>) -> Result<RefreshSummary> {
        let due = self.repository.podcasts_due_for_refresh(cutoff).await?;
        tracing::info!(count = due.len(), "Refreshing podcasts due since {}", cutoff);

        let results: Vec<_> = stream::iter(due)
            .map(|podcast| async move {
                let result = self.refresh_feed(&podcast, Some(self.feed_timeout)).await;
                (podcast, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut summary = RefreshSummary::default();
        for (podcast, result) in results {
            match result {
                Ok(outcome) => {
                    summary.refreshed += 1;
                    summary.new_episodes += outcome.new_episodes;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        podcast_id = podcast.id,
                        error = %e,
                        "Failed to refresh {}",
                        podcast.feed_url
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Fetch and store one feed. `limit` bounds the fetch and parse only;
    /// once the write is queued it runs to completion.
    async fn refresh_feed(
        &self,
        podcast: &Podcast,
        limit: Option<Duration>,
    ) -> Result<RefreshOutcome> {
        let fetch = fetch_and_parse(&self.source, &podcast.feed_url);
        let parsed = match limit {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                AppError::fetch(
                    &podcast.feed_url,
                    format!("fetch timed out after {:?}", limit),
                )
            })??,
            None => fetch.await?,
        };

        let outcome = self
            .repository
            .refresh_podcast(podcast.id, parsed, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Podcast {}", podcast.id)))?;

        tracing::info!(
            podcast_id = podcast.id,
            new_episodes = outcome.new_episodes,
            "Refreshed {}",
            outcome.podcast.title
        );

        Ok(outcome)
    }
}

fn validate_feed_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| AppError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(AppError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            raw, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https_urls() {
        assert_eq!(
            validate_feed_url(" https://example.com/feed.xml ").unwrap(),
            "https://example.com/feed.xml"
        );
        assert!(validate_feed_url("http://example.com/rss").is_ok());
    }

    #[test]
    fn rejects_other_urls() {
        assert!(matches!(
            validate_feed_url("ftp://example.com/feed"),
            Err(AppError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_feed_url("not a url"),
            Err(AppError::InvalidUrl(_))
        ));
    }
}
