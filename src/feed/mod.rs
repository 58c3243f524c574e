mod document;
mod duration;
mod fetcher;
mod normalizer;

use chrono::Utc;

pub use document::{
    parse_feed, FeedDocument, FeedFormat, GenericFormat, RawDate, RawItem, RssFormat,
};
pub use duration::{format_duration, parse_duration, ParsedDuration};
pub use fetcher::{FeedCache, FeedFetcher, FeedSource};
pub use normalizer::{normalize_feed, normalize_item, parse_published, strip_markup};

use crate::error::Result;
use crate::models::ParsedFeed;

/// Fetch a feed and normalize it. Nothing is returned unless every step succeeds.
pub async fn fetch_and_parse<S: FeedSource>(source: &S, url: &str) -> Result<ParsedFeed> {
    let bytes = source.fetch(url).await?;
    let fetched_at = Utc::now();
    let document = parse_feed(&bytes)?;
    let item_count = document.items.len();
    let parsed = normalize_feed(document, fetched_at)?;

    tracing::debug!(
        "Parsed {} episodes from {} ({} items in document)",
        parsed.episodes.len(),
        url,
        item_count
    );

    Ok(parsed)
}
