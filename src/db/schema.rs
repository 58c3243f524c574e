pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- podcasts table
CREATE TABLE IF NOT EXISTS podcasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    feed_url TEXT NOT NULL UNIQUE,
    image_url TEXT,
    author TEXT,
    website_url TEXT,
    last_refreshed_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_podcasts_last_refreshed_at ON podcasts(last_refreshed_at);

-- episodes table (guid is the global dedup key)
CREATE TABLE IF NOT EXISTS episodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    podcast_id INTEGER NOT NULL REFERENCES podcasts(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    audio_url TEXT NOT NULL,
    guid TEXT NOT NULL UNIQUE,
    thumbnail_url TEXT,
    duration_seconds INTEGER,
    duration_formatted TEXT,
    published_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_episodes_podcast_published ON episodes(podcast_id, published_at DESC);

-- subscriptions table
CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    podcast_id INTEGER NOT NULL REFERENCES podcasts(id) ON DELETE CASCADE,
    subscribed_at TEXT NOT NULL,
    UNIQUE(user_id, podcast_id)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_podcast_id ON subscriptions(podcast_id);

-- completions table (absence of a row means not completed)
CREATE TABLE IF NOT EXISTS completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    episode_id INTEGER NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
    is_completed INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    UNIQUE(user_id, episode_id)
);

CREATE INDEX IF NOT EXISTS idx_completions_episode_id ON completions(episode_id);
"#;
