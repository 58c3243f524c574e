use std::time::Duration;

use crate::cli::{Command, Invocation, USAGE};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::FeedFetcher;
use crate::ingest::Ingestor;
use crate::library::Library;
use crate::models::{Podcast, UserEpisode};
use crate::scheduler::Scheduler;

pub struct App {
    ingestor: Ingestor<FeedFetcher>,
    library: Library,
    default_user_id: i64,
    refresh_interval: Duration,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let fetcher = FeedFetcher::new(config)?;

        let ingestor = Ingestor::new(repository.clone(), fetcher)
            .with_limits(config.max_concurrent_fetches, config.fetch_timeout() * 2);
        let library = Library::new(repository);

        Ok(Self {
            ingestor,
            library,
            default_user_id: config.default_user_id,
            refresh_interval: config.refresh_interval(),
        })
    }

    pub async fn run(&self, invocation: Invocation) -> Result<()> {
        let user_id = invocation.user_id.unwrap_or(self.default_user_id);

        match invocation.command {
            Command::Help => println!("{}", USAGE),

            Command::Add(url) => {
                let podcast = self.ingestor.add_podcast(&url, user_id).await?;
                let episodes = self.ingestor.repository().count_episodes(podcast.id).await?;
                println!(
                    "Podcast added successfully: [{}] {} ({} episodes)",
                    podcast.id, podcast.title, episodes
                );
            }

            Command::Refresh(podcast_id) => {
                let count = self.ingestor.refresh_podcast(podcast_id, user_id).await?;
                println!("Feed refreshed successfully! Added {} new episodes.", count);
            }

            Command::Remove(podcast_id) => {
                let deleted = self.ingestor.remove_subscription(podcast_id, user_id).await?;
                if deleted {
                    println!("Podcast removed (no subscribers left, episodes deleted).");
                } else {
                    println!("Podcast removed.");
                }
            }

            Command::Podcasts => {
                for podcast in self.library.podcasts(user_id).await? {
                    print_podcast(&podcast);
                }
            }

            Command::Episodes(args) => {
                for episode in self.library.episodes(user_id, args.into()).await? {
                    print_episode(&episode);
                }
            }

            Command::Toggle(episode_id) => {
                let state = self.library.toggle_completed(user_id, episode_id).await?;
                match state.completed_at {
                    Some(at) if state.is_completed => {
                        println!("Episode {} completed at {}", episode_id, at.to_rfc3339())
                    }
                    _ => println!("Episode {} marked not completed", episode_id),
                }
            }

            Command::CompleteAll(podcast_id) => {
                let count = self.library.mark_all_completed(user_id, podcast_id).await?;
                println!("Marked {} episodes as completed.", count);
            }

            Command::IncompleteAll(podcast_id) => {
                let count = self.library.mark_all_incomplete(user_id, podcast_id).await?;
                println!("Marked {} episodes as incomplete.", count);
            }

            Command::Stats(podcast_id) => {
                let stats = self.library.completion_stats(user_id, podcast_id).await?;
                println!("{}/{} episodes completed", stats.completed, stats.total);
            }

            Command::RefreshDue => {
                let summary = Scheduler::new(&self.ingestor, self.refresh_interval)
                    .tick()
                    .await?;
                println!(
                    "Refreshed {} podcasts ({} failed), {} new episodes",
                    summary.refreshed, summary.failed, summary.new_episodes
                );
            }

            Command::Watch => {
                let shutdown = async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for ctrl-c: {}", e);
                    }
                };
                Scheduler::new(&self.ingestor, self.refresh_interval)
                    .run(shutdown)
                    .await?;
            }
        }

        Ok(())
    }
}

fn print_podcast(podcast: &Podcast) {
    let refreshed = podcast
        .last_refreshed_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "[{}] {} by {} (refreshed {})",
        podcast.id,
        podcast.title,
        podcast.author.as_deref().unwrap_or("unknown"),
        refreshed
    );
}

fn print_episode(entry: &UserEpisode) {
    let episode = &entry.episode;
    println!(
        "[{}] {} {} - {} ({})",
        episode.id,
        if entry.is_completed { "x" } else { " " },
        episode.published_at.format("%Y-%m-%d"),
        episode.title,
        episode.duration_formatted.as_deref().unwrap_or("?:??")
    );
}
