use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::feed::FeedSource;
use crate::ingest::{Ingestor, RefreshSummary};

/// Periodically refreshes podcasts whose last refresh is older than `every`.
pub struct Scheduler<'a, S> {
    ingestor: &'a Ingestor<S>,
    every: Duration,
    last_pass_end: Mutex<Option<DateTime<Utc>>>,
}

impl<'a, S: FeedSource> Scheduler<'a, S> {
    pub fn new(ingestor: &'a Ingestor<S>, every: Duration) -> Self {
        Self {
            ingestor,
            every,
            last_pass_end: Mutex::new(None),
        }
    }

    /// One pass: refresh everything that went stale.
    ///
    /// Anything stamped before the previous pass finished is due again, so a
    /// podcast refreshed by one pass is picked up by the next.
    pub async fn tick(&self) -> Result<RefreshSummary> {
        let summary = self.ingestor.refresh_due(self.cutoff(Utc::now())).await;
        if let Ok(mut last) = self.last_pass_end.lock() {
            *last = Some(Utc::now());
        }
        summary
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let every = chrono::Duration::from_std(self.every).unwrap_or(chrono::Duration::hours(1));
        let stale = now - every;
        match self.last_pass_end.lock().ok().and_then(|last| *last) {
            Some(end) => end.max(stale),
            None => stale,
        }
    }

    /// Tick until `shutdown` resolves. The first pass runs immediately.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Scheduler stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) => tracing::info!(
                            refreshed = summary.refreshed,
                            failed = summary.failed,
                            new_episodes = summary.new_episodes,
                            "Refresh pass finished"
                        ),
                        Err(e) => tracing::error!("Refresh pass failed: {}", e),
                    }
                }
            }
        }
    }
}
