use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    CompletionState, CompletionStats, Episode, EpisodeFilter, EpisodeOrder, NewEpisode,
    ParsedFeed, Podcast, Subscription, UserEpisode,
};

use super::schema::SCHEMA;

const PODCAST_COLUMNS: &str = "id, title, description, feed_url, image_url, author, website_url, last_refreshed_at";

const EPISODE_COLUMNS: &str = "e.id, e.podcast_id, e.title, e.description, e.audio_url, e.guid, \
     e.thumbnail_url, e.duration_seconds, e.duration_formatted, e.published_at";

/// Result of reconciling a fresh parse into an existing podcast.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub podcast: Podcast,
    pub new_episodes: usize,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Podcast operations

    pub async fn find_podcast_by_feed_url(&self, feed_url: &str) -> Result<Option<Podcast>> {
        let feed_url = feed_url.to_string();
        let podcast = self
            .conn
            .call(move |conn| Ok(podcast_by_feed_url(conn, &feed_url)?))
            .await?;
        Ok(podcast)
    }

    pub async fn get_podcast(&self, id: i64) -> Result<Option<Podcast>> {
        let podcast = self
            .conn
            .call(move |conn| Ok(podcast_by_id(conn, id)?))
            .await?;
        Ok(podcast)
    }

    /// Create path: store a never-seen feed and all of its episodes atomically.
    ///
    /// If another writer created the same feed URL first, that row is
    /// returned and nothing is inserted.
    pub async fn create_podcast_with_episodes(
        &self,
        feed_url: &str,
        parsed: ParsedFeed,
        now: DateTime<Utc>,
    ) -> Result<(Podcast, usize)> {
        let feed_url = feed_url.to_string();
        let created = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let meta = &parsed.metadata;

                let inserted = tx.execute(
                    r#"INSERT INTO podcasts (title, description, feed_url, image_url, author, website_url, last_refreshed_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(feed_url) DO NOTHING"#,
                    params![
                        meta.title.clone().unwrap_or_else(|| feed_url.clone()),
                        meta.description,
                        feed_url,
                        meta.image_url,
                        meta.author,
                        meta.website_url,
                        timestamp(now),
                    ],
                )?;

                let mut new_episodes = 0;
                if inserted > 0 {
                    let podcast_id = tx.last_insert_rowid();
                    for episode in &parsed.episodes {
                        if insert_episode(&tx, podcast_id, episode)? {
                            new_episodes += 1;
                        }
                    }
                }

                let podcast = podcast_by_feed_url(&tx, &feed_url)?
                    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                tx.commit()?;
                Ok((podcast, new_episodes))
            })
            .await?;
        Ok(created)
    }

    /// Refresh path: merge metadata and append unknown episodes atomically.
    ///
    /// Returns `None` when the podcast does not exist.
    pub async fn refresh_podcast(
        &self,
        podcast_id: i64,
        parsed: ParsedFeed,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshOutcome>> {
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let meta = &parsed.metadata;

                let updated = tx.execute(
                    r#"UPDATE podcasts SET
                           title = COALESCE(?2, title),
                           description = COALESCE(?3, description),
                           image_url = COALESCE(?4, image_url),
                           author = COALESCE(?5, author),
                           website_url = COALESCE(?6, website_url),
                           last_refreshed_at = ?7
                       WHERE id = ?1"#,
                    params![
                        podcast_id,
                        meta.title,
                        meta.description,
                        meta.image_url,
                        meta.author,
                        meta.website_url,
                        timestamp(now),
                    ],
                )?;
                if updated == 0 {
                    return Ok(None);
                }

                let mut new_episodes = 0;
                for episode in &parsed.episodes {
                    if insert_episode(&tx, podcast_id, episode)? {
                        new_episodes += 1;
                    }
                }

                let podcast = podcast_by_id(&tx, podcast_id)?
                    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                tx.commit()?;
                Ok(Some(RefreshOutcome {
                    podcast,
                    new_episodes,
                }))
            })
            .await?;
        Ok(outcome)
    }

    pub async fn podcasts_for_user(&self, user_id: i64) -> Result<Vec<Podcast>> {
        let podcasts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {PODCAST_COLUMNS} FROM podcasts
                       WHERE id IN (SELECT podcast_id FROM subscriptions WHERE user_id = ?1)
                       ORDER BY title"#
                ))?;
                let podcasts = stmt
                    .query_map(params![user_id], podcast_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(podcasts)
            })
            .await?;
        Ok(podcasts)
    }

    /// Podcasts never refreshed, or last refreshed before `cutoff`.
    pub async fn podcasts_due_for_refresh(&self, cutoff: DateTime<Utc>) -> Result<Vec<Podcast>> {
        let podcasts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {PODCAST_COLUMNS} FROM podcasts
                       WHERE last_refreshed_at IS NULL OR last_refreshed_at < ?1
                       ORDER BY last_refreshed_at NULLS FIRST"#
                ))?;
                let podcasts = stmt
                    .query_map(params![timestamp(cutoff)], podcast_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(podcasts)
            })
            .await?;
        Ok(podcasts)
    }

    // Episode operations

    /// Insert one episode unless its guid is already stored anywhere.
    pub async fn insert_episode(&self, podcast_id: i64, episode: NewEpisode) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| Ok(insert_episode(conn, podcast_id, &episode)?))
            .await?;
        Ok(inserted)
    }

    pub async fn find_episode_by_guid(&self, guid: &str) -> Result<Option<Episode>> {
        let guid = guid.to_string();
        let episode = self
            .conn
            .call(move |conn| {
                let episode = conn
                    .query_row(
                        &format!("SELECT {EPISODE_COLUMNS} FROM episodes e WHERE e.guid = ?1"),
                        params![guid],
                        episode_from_row,
                    )
                    .optional()?;
                Ok(episode)
            })
            .await?;
        Ok(episode)
    }

    pub async fn get_episode(&self, id: i64) -> Result<Option<Episode>> {
        let episode = self
            .conn
            .call(move |conn| {
                let episode = conn
                    .query_row(
                        &format!("SELECT {EPISODE_COLUMNS} FROM episodes e WHERE e.id = ?1"),
                        params![id],
                        episode_from_row,
                    )
                    .optional()?;
                Ok(episode)
            })
            .await?;
        Ok(episode)
    }

    pub async fn episodes_for_podcast(&self, podcast_id: i64) -> Result<Vec<Episode>> {
        let episodes = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {EPISODE_COLUMNS} FROM episodes e
                       WHERE e.podcast_id = ?1
                       ORDER BY e.published_at DESC, e.id"#
                ))?;
                let episodes = stmt
                    .query_map(params![podcast_id], episode_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(episodes)
            })
            .await?;
        Ok(episodes)
    }

    pub async fn count_episodes(&self, podcast_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM episodes WHERE podcast_id = ?1",
                    params![podcast_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Episodes of the user's subscriptions together with their completion state.
    pub async fn episodes_for_user(
        &self,
        user_id: i64,
        filter: EpisodeFilter,
    ) -> Result<Vec<UserEpisode>> {
        let order = match filter.order {
            EpisodeOrder::Newest => "DESC",
            EpisodeOrder::Oldest => "ASC",
        };
        let episodes = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {EPISODE_COLUMNS}, p.title,
                              COALESCE(c.is_completed, 0), c.completed_at
                       FROM episodes e
                       JOIN podcasts p ON p.id = e.podcast_id
                       JOIN subscriptions s ON s.podcast_id = e.podcast_id AND s.user_id = ?1
                       LEFT JOIN completions c ON c.episode_id = e.id AND c.user_id = ?1
                       WHERE (?2 IS NULL OR e.podcast_id = ?2)
                         AND (?3 = 0 OR COALESCE(c.is_completed, 0) = 0)
                       ORDER BY e.published_at {order}, e.id"#
                ))?;
                let episodes = stmt
                    .query_map(
                        params![user_id, filter.podcast_id, filter.hide_completed],
                        |row| {
                            Ok(UserEpisode {
                                episode: episode_from_row(row)?,
                                podcast_title: row.get(10)?,
                                is_completed: row.get(11)?,
                                completed_at: row
                                    .get::<_, Option<String>>(12)?
                                    .and_then(|s| parse_datetime(&s)),
                            })
                        },
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(episodes)
            })
            .await?;
        Ok(episodes)
    }

    // Subscription operations

    /// First-or-create: an existing subscription keeps its original timestamp.
    pub async fn subscribe(
        &self,
        user_id: i64,
        podcast_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let subscription = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO subscriptions (user_id, podcast_id, subscribed_at)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(user_id, podcast_id) DO NOTHING"#,
                    params![user_id, podcast_id, timestamp(now)],
                )?;
                let subscription = conn.query_row(
                    "SELECT user_id, podcast_id, subscribed_at FROM subscriptions WHERE user_id = ?1 AND podcast_id = ?2",
                    params![user_id, podcast_id],
                    |row| {
                        Ok(Subscription {
                            user_id: row.get(0)?,
                            podcast_id: row.get(1)?,
                            subscribed_at: parse_datetime(&row.get::<_, String>(2)?)
                                .unwrap_or(now),
                        })
                    },
                )?;
                Ok(subscription)
            })
            .await?;
        Ok(subscription)
    }

    pub async fn is_subscribed(&self, user_id: i64, podcast_id: i64) -> Result<bool> {
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM subscriptions WHERE user_id = ?1 AND podcast_id = ?2",
                    params![user_id, podcast_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    pub async fn count_subscribers(&self, podcast_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| Ok(subscriber_count(conn, podcast_id)?))
            .await?;
        Ok(count)
    }

    /// Delete a subscription, then the podcast if nobody follows it any more.
    ///
    /// Returns whether the podcast (and with it its episodes) was deleted.
    pub async fn unsubscribe(&self, user_id: i64, podcast_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM subscriptions WHERE user_id = ?1 AND podcast_id = ?2",
                    params![user_id, podcast_id],
                )?;

                let deleted = if subscriber_count(&tx, podcast_id)? == 0 {
                    tx.execute("DELETE FROM podcasts WHERE id = ?1", params![podcast_id])? > 0
                } else {
                    false
                };

                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    // Completion operations

    /// Whether the episode belongs to a podcast the user subscribes to.
    pub async fn can_access_episode(&self, user_id: i64, episode_id: i64) -> Result<bool> {
        let allowed = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    r#"SELECT COUNT(*) FROM episodes e
                       JOIN subscriptions s ON s.podcast_id = e.podcast_id
                       WHERE e.id = ?1 AND s.user_id = ?2"#,
                    params![episode_id, user_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(allowed)
    }

    pub async fn completion_state(&self, user_id: i64, episode_id: i64) -> Result<CompletionState> {
        let state = self
            .conn
            .call(move |conn| {
                let state = conn
                    .query_row(
                        "SELECT is_completed, completed_at FROM completions WHERE user_id = ?1 AND episode_id = ?2",
                        params![user_id, episode_id],
                        completion_from_row,
                    )
                    .optional()?;
                Ok(state.unwrap_or_default())
            })
            .await?;
        Ok(state)
    }

    /// Create the record if needed, then flip it.
    pub async fn toggle_completion(
        &self,
        user_id: i64,
        episode_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CompletionState> {
        let state = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO completions (user_id, episode_id, is_completed)
                       VALUES (?1, ?2, 0)
                       ON CONFLICT(user_id, episode_id) DO NOTHING"#,
                    params![user_id, episode_id],
                )?;

                let current = tx.query_row(
                    "SELECT is_completed, completed_at FROM completions WHERE user_id = ?1 AND episode_id = ?2",
                    params![user_id, episode_id],
                    completion_from_row,
                )?;

                let next = CompletionState {
                    is_completed: !current.is_completed,
                    completed_at: (!current.is_completed).then_some(now),
                };

                tx.execute(
                    "UPDATE completions SET is_completed = ?3, completed_at = ?4 WHERE user_id = ?1 AND episode_id = ?2",
                    params![
                        user_id,
                        episode_id,
                        next.is_completed,
                        next.completed_at.map(timestamp)
                    ],
                )?;

                tx.commit()?;
                Ok(next)
            })
            .await?;
        Ok(state)
    }

    /// Mark every episode of the user's subscriptions (optionally one podcast)
    /// completed. Returns how many episodes changed state.
    ///
    /// Episodes with no completion record yet get one created as completed,
    /// and those count as changed alongside flipped records. Only episodes
    /// already completed are left out of the count.
    pub async fn mark_all_completed(
        &self,
        user_id: i64,
        podcast_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO completions (user_id, episode_id, is_completed, completed_at)
                       SELECT ?1, e.id, 1, ?3 FROM episodes e
                       JOIN subscriptions s ON s.podcast_id = e.podcast_id AND s.user_id = ?1
                       WHERE (?2 IS NULL OR e.podcast_id = ?2)
                       ON CONFLICT(user_id, episode_id) DO UPDATE SET
                           is_completed = 1,
                           completed_at = excluded.completed_at
                       WHERE completions.is_completed = 0"#,
                    params![user_id, podcast_id, timestamp(now)],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    /// Reset completed records back to incomplete. Returns how many changed.
    pub async fn mark_all_incomplete(
        &self,
        user_id: i64,
        podcast_id: Option<i64>,
    ) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE completions SET is_completed = 0, completed_at = NULL
                       WHERE user_id = ?1 AND is_completed = 1
                         AND episode_id IN (
                             SELECT e.id FROM episodes e
                             JOIN subscriptions s ON s.podcast_id = e.podcast_id AND s.user_id = ?1
                             WHERE (?2 IS NULL OR e.podcast_id = ?2)
                         )"#,
                    params![user_id, podcast_id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn completion_stats(&self, user_id: i64, podcast_id: i64) -> Result<CompletionStats> {
        let stats = self
            .conn
            .call(move |conn| {
                let stats = conn.query_row(
                    r#"SELECT COUNT(*), COALESCE(SUM(c.is_completed), 0)
                       FROM episodes e
                       LEFT JOIN completions c ON c.episode_id = e.id AND c.user_id = ?1
                       WHERE e.podcast_id = ?2"#,
                    params![user_id, podcast_id],
                    |row| {
                        Ok(CompletionStats {
                            total: row.get(0)?,
                            completed: row.get(1)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}

/// Fixed-width UTC text so stored timestamps sort lexically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000000Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn insert_episode(
    conn: &SqliteConnection,
    podcast_id: i64,
    episode: &NewEpisode,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        r#"INSERT INTO episodes (podcast_id, title, description, audio_url, guid, thumbnail_url,
                                 duration_seconds, duration_formatted, published_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT(guid) DO NOTHING"#,
        params![
            podcast_id,
            episode.title,
            episode.description,
            episode.audio_url,
            episode.guid,
            episode.thumbnail_url,
            episode.duration_seconds,
            episode.duration_formatted,
            timestamp(episode.published_at),
        ],
    )?;
    if inserted == 0 {
        tracing::debug!("Episode {} already stored, skipping", episode.guid);
    }
    Ok(inserted > 0)
}

fn podcast_by_id(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Podcast>> {
    conn.query_row(
        &format!("SELECT {PODCAST_COLUMNS} FROM podcasts WHERE id = ?1"),
        params![id],
        podcast_from_row,
    )
    .optional()
}

fn podcast_by_feed_url(
    conn: &SqliteConnection,
    feed_url: &str,
) -> rusqlite::Result<Option<Podcast>> {
    conn.query_row(
        &format!("SELECT {PODCAST_COLUMNS} FROM podcasts WHERE feed_url = ?1"),
        params![feed_url],
        podcast_from_row,
    )
    .optional()
}

fn subscriber_count(conn: &SqliteConnection, podcast_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM subscriptions WHERE podcast_id = ?1",
        params![podcast_id],
        |row| row.get(0),
    )
}

fn podcast_from_row(row: &Row) -> rusqlite::Result<Podcast> {
    Ok(Podcast {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        feed_url: row.get(3)?,
        image_url: row.get(4)?,
        author: row.get(5)?,
        website_url: row.get(6)?,
        last_refreshed_at: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| parse_datetime(&s)),
    })
}

fn episode_from_row(row: &Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(0)?,
        podcast_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        audio_url: row.get(4)?,
        guid: row.get(5)?,
        thumbnail_url: row.get(6)?,
        duration_seconds: row.get(7)?,
        duration_formatted: row.get(8)?,
        published_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}

fn completion_from_row(row: &Row) -> rusqlite::Result<CompletionState> {
    Ok(CompletionState {
        is_completed: row.get(0)?,
        completed_at: row
            .get::<_, Option<String>>(1)?
            .and_then(|s| parse_datetime(&s)),
    })
}
