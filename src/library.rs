use chrono::Utc;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{CompletionState, CompletionStats, EpisodeFilter, Podcast, UserEpisode};

/// Per-user view of the store: subscriptions and episode completion.
#[derive(Clone)]
pub struct Library {
    repository: Repository,
}

impl Library {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn podcasts(&self, user_id: i64) -> Result<Vec<Podcast>> {
        self.repository.podcasts_for_user(user_id).await
    }

    pub async fn episodes(&self, user_id: i64, filter: EpisodeFilter) -> Result<Vec<UserEpisode>> {
        if let Some(podcast_id) = filter.podcast_id {
            self.ensure_subscribed(user_id, podcast_id).await?;
        }
        self.repository.episodes_for_user(user_id, filter).await
    }

    pub async fn toggle_completed(&self, user_id: i64, episode_id: i64) -> Result<CompletionState> {
        let episode = self
            .repository
            .get_episode(episode_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Episode {}", episode_id)))?;

        if !self.repository.can_access_episode(user_id, episode_id).await? {
            return Err(AppError::Unauthorized {
                user_id,
                podcast_id: episode.podcast_id,
            });
        }

        let state = self
            .repository
            .toggle_completion(user_id, episode_id, Utc::now())
            .await?;
        tracing::debug!(
            user_id,
            episode_id,
            completed = state.is_completed,
            "Toggled completion"
        );
        Ok(state)
    }

    pub async fn mark_all_completed(&self, user_id: i64, podcast_id: Option<i64>) -> Result<usize> {
        if let Some(podcast_id) = podcast_id {
            self.ensure_subscribed(user_id, podcast_id).await?;
        }
        self.repository
            .mark_all_completed(user_id, podcast_id, Utc::now())
            .await
    }

    pub async fn mark_all_incomplete(
        &self,
        user_id: i64,
        podcast_id: Option<i64>,
    ) -> Result<usize> {
        if let Some(podcast_id) = podcast_id {
            self.ensure_subscribed(user_id, podcast_id).await?;
        }
        self.repository.mark_all_incomplete(user_id, podcast_id).await
    }

    pub async fn completion_stats(&self, user_id: i64, podcast_id: i64) -> Result<CompletionStats> {
        self.ensure_subscribed(user_id, podcast_id).await?;
        self.repository.completion_stats(user_id, podcast_id).await
    }

    async fn ensure_subscribed(&self, user_id: i64, podcast_id: i64) -> Result<()> {
        if self.repository.is_subscribed(user_id, podcast_id).await? {
            Ok(())
        } else {
            Err(AppError::Unauthorized {
                user_id,
                podcast_id,
            })
        }
    }
}
