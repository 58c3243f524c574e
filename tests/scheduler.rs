mod common;

use std::time::Duration;

use podtrack::scheduler::Scheduler;
use tokio_test::assert_ok;

use common::{rss, Harness, Item, FEED_URL};

async fn subscribed_harness() -> Harness {
    let h = Harness::new().await;
    h.source().set(FEED_URL, rss("Systems Hour", None, &[Item::new("ep-1")]));
    h.ingestor.add_podcast(FEED_URL, 1).await.unwrap();
    h
}

#[tokio::test]
async fn tick_picks_up_podcasts_refreshed_by_previous_pass() {
    let h = subscribed_harness().await;
    let scheduler = Scheduler::new(&h.ingestor, Duration::from_secs(3600));

    // Just added, so nothing is stale yet.
    let first = assert_ok!(scheduler.tick().await);
    assert_eq!(first.refreshed, 0);

    let second = assert_ok!(scheduler.tick().await);
    assert_eq!((second.refreshed, second.failed), (1, 0));

    let third = assert_ok!(scheduler.tick().await);
    assert_eq!(third.refreshed, 1);
    assert_eq!(third.new_episodes, 0);
}

#[tokio::test]
async fn run_refreshes_on_every_tick_with_slow_feeds() {
    let h = subscribed_harness().await;
    h.source().set_latency(Duration::from_millis(50));
    let before = h.source().requests();

    let scheduler = Scheduler::new(&h.ingestor, Duration::from_millis(200));
    let shutdown = tokio::time::sleep(Duration::from_millis(1_100));
    assert_ok!(scheduler.run(shutdown).await);

    // Passes start at 0, 200, ..., 1000 ms; the first finds nothing stale.
    let refreshes = h.source().requests() - before;
    assert!(refreshes >= 4, "only {refreshes} refreshes across six passes");
}

#[tokio::test]
async fn run_stops_when_shutdown_resolves() {
    let h = subscribed_harness().await;
    let scheduler = Scheduler::new(&h.ingestor, Duration::from_secs(3600));

    let result = tokio::time::timeout(Duration::from_secs(5), scheduler.run(async {})).await;
    assert!(result.is_ok());
}
