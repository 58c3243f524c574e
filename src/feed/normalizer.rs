use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{NewEpisode, ParsedFeed};

use super::document::{FeedDocument, RawDate, RawItem};
use super::duration::parse_duration;

const TEXT_WIDTH: usize = 1000;

/// Normalize every item of a parsed document, in document order.
///
/// Items without an enclosure are dropped. A publish date that cannot be
/// parsed fails the whole feed.
pub fn normalize_feed(doc: FeedDocument, fetched_at: DateTime<Utc>) -> Result<ParsedFeed> {
    let mut episodes = Vec::with_capacity(doc.items.len());
    for item in &doc.items {
        if let Some(episode) = normalize_item(item, fetched_at)? {
            episodes.push(episode);
        }
    }

    Ok(ParsedFeed {
        metadata: doc.metadata,
        episodes,
    })
}

/// Turn one raw entry into an episode, or `None` when it has no audio.
pub fn normalize_item(item: &RawItem, fetched_at: DateTime<Utc>) -> Result<Option<NewEpisode>> {
    let Some(audio_url) = item.enclosure_url.clone() else {
        tracing::debug!(
            "Skipping item without enclosure: {}",
            item.title.as_deref().unwrap_or("<untitled>")
        );
        return Ok(None);
    };

    let guid = item
        .guid
        .clone()
        .or_else(|| item.link.clone())
        .unwrap_or_else(|| audio_url.clone());

    let published_at = match &item.published {
        Some(RawDate::Parsed(dt)) => *dt,
        Some(RawDate::Text(raw)) => parse_published(raw).ok_or_else(|| {
            AppError::Parse(format!("invalid publish date {:?} for item {}", raw, guid))
        })?,
        None => fetched_at,
    };

    let duration = item
        .duration
        .as_deref()
        .map(parse_duration)
        .unwrap_or_default();

    Ok(Some(NewEpisode {
        title: item.title.clone().unwrap_or_default(),
        description: item.description.as_deref().and_then(strip_markup),
        audio_url,
        guid,
        thumbnail_url: item.image_url.clone(),
        duration_seconds: duration.seconds,
        duration_formatted: duration.formatted,
        published_at,
    }))
}

/// Reduce an HTML fragment to plain text.
pub fn strip_markup(html: &str) -> Option<String> {
    let text = if html.contains('<') || html.contains('&') {
        html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_else(|_| html.to_string())
    } else {
        html.to_string()
    };

    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Parse a feed date. RSS mandates RFC 2822 but feeds in the wild vary.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%a, %d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M:%S %z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(guid: &str) -> RawItem {
        RawItem {
            title: Some(format!("Episode {guid}")),
            description: Some("Plain description".to_string()),
            enclosure_url: Some(format!("https://cdn.example.com/{guid}.mp3")),
            guid: Some(guid.to_string()),
            link: None,
            image_url: None,
            duration: None,
            published: Some(RawDate::Text("Mon, 01 Jan 2024 08:30:00 +0000".to_string())),
        }
    }

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn maps_fields_to_episode() {
        let mut raw = item("abc-123");
        raw.duration = Some("3725".to_string());
        raw.image_url = Some("https://img.example.com/ep.jpg".to_string());

        let episode = normalize_item(&raw, fetched_at()).unwrap().unwrap();
        assert_eq!(episode.guid, "abc-123");
        assert_eq!(episode.title, "Episode abc-123");
        assert_eq!(episode.audio_url, "https://cdn.example.com/abc-123.mp3");
        assert_eq!(episode.description.as_deref(), Some("Plain description"));
        assert_eq!(episode.thumbnail_url.as_deref(), Some("https://img.example.com/ep.jpg"));
        assert_eq!(episode.duration_seconds, Some(3725));
        assert_eq!(episode.duration_formatted.as_deref(), Some("1:02:05"));
        assert_eq!(
            episode.published_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn items_without_enclosure_are_skipped() {
        let mut missing = item("b");
        missing.enclosure_url = None;

        let doc = FeedDocument {
            metadata: Default::default(),
            items: vec![item("a"), missing, item("c")],
        };

        let parsed = normalize_feed(doc, fetched_at()).unwrap();
        let guids: Vec<_> = parsed.episodes.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, ["a", "c"]);
    }

    #[test]
    fn unknown_duration_and_thumbnail_are_none() {
        let mut raw = item("x");
        raw.duration = Some("about an hour".to_string());

        let episode = normalize_item(&raw, fetched_at()).unwrap().unwrap();
        assert_eq!(episode.duration_seconds, None);
        assert_eq!(episode.duration_formatted, None);
        assert_eq!(episode.thumbnail_url, None);
    }

    #[test]
    fn guid_falls_back_to_link_then_enclosure() {
        let mut raw = item("x");
        raw.guid = None;
        raw.link = Some("https://example.com/ep/x".to_string());
        let episode = normalize_item(&raw, fetched_at()).unwrap().unwrap();
        assert_eq!(episode.guid, "https://example.com/ep/x");

        raw.link = None;
        let episode = normalize_item(&raw, fetched_at()).unwrap().unwrap();
        assert_eq!(episode.guid, "https://cdn.example.com/x.mp3");
    }

    #[test]
    fn bad_publish_date_fails_the_feed() {
        let mut bad = item("b");
        bad.published = Some(RawDate::Text("sometime last week".to_string()));

        let doc = FeedDocument {
            metadata: Default::default(),
            items: vec![item("a"), bad],
        };

        let err = normalize_feed(doc, fetched_at()).unwrap_err();
        assert!(matches!(err, AppError::Parse(msg) if msg.contains("sometime last week")));
    }

    #[test]
    fn missing_publish_date_uses_fetch_time() {
        let mut raw = item("x");
        raw.published = None;
        let episode = normalize_item(&raw, fetched_at()).unwrap().unwrap();
        assert_eq!(episode.published_at, fetched_at());
    }

    #[test]
    fn accepts_common_date_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(parse_published("Sat, 03 Feb 2024 04:05:06 GMT"), Some(expected));
        assert_eq!(parse_published("2024-02-03T04:05:06Z"), Some(expected));
        assert_eq!(parse_published("2024-02-03 04:05:06"), Some(expected));
        assert_eq!(parse_published("not a date"), None);
    }

    #[test]
    fn markup_is_stripped_from_description() {
        let text = strip_markup("<p>Great <br/>episode</p>").unwrap();
        assert!(!text.contains('<'));
        assert!(text.contains("Great"));
        assert!(text.contains("episode"));

        assert_eq!(strip_markup("   "), None);
        assert_eq!(strip_markup("<p></p>"), None);
    }
}
