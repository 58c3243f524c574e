use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed as GenericFeed, Link};

use crate::error::{AppError, Result};
use crate::models::FeedMetadata;

/// One feed entry before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub enclosure_url: Option<String>,
    pub guid: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub duration: Option<String>,
    pub published: Option<RawDate>,
}

/// RSS carries dates as text, other formats arrive already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDate {
    Text(String),
    Parsed(DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub metadata: FeedMetadata,
    pub items: Vec<RawItem>,
}

/// A wire format that can be turned into a [`FeedDocument`].
pub trait FeedFormat {
    fn name(&self) -> &'static str;
    fn parse(&self, bytes: &[u8]) -> Result<FeedDocument>;
}

/// RSS 2.0 with the iTunes podcast extension.
pub struct RssFormat;

/// Atom, RSS 1.0 and JSON Feed.
pub struct GenericFormat;

/// Parse a feed document, picking the wire format from the document itself.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument> {
    let rss_error = match rss::Channel::read_from(bytes) {
        Ok(channel) => return Ok(RssFormat::document(&channel)),
        Err(e) => e,
    };

    tracing::debug!("Not an RSS 2.0 document ({}), trying {}", rss_error, GenericFormat.name());
    GenericFormat.parse(bytes).map_err(|generic_error| match rss_error {
        // Not RSS at all, so the other parser's complaint is the relevant one.
        rss::Error::InvalidStartTag | rss::Error::Eof => generic_error,
        other => AppError::Parse(other.to_string()),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FeedFormat for RssFormat {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn parse(&self, bytes: &[u8]) -> Result<FeedDocument> {
        let channel =
            rss::Channel::read_from(bytes).map_err(|e| AppError::Parse(e.to_string()))?;
        Ok(Self::document(&channel))
    }
}

impl RssFormat {
    fn document(channel: &rss::Channel) -> FeedDocument {
        let itunes = channel.itunes_ext();
        let metadata = FeedMetadata {
            title: non_empty(Some(channel.title())),
            description: non_empty(Some(channel.description()))
                .or_else(|| non_empty(itunes.and_then(|i| i.summary()))),
            image_url: non_empty(itunes.and_then(|i| i.image()))
                .or_else(|| non_empty(channel.image().map(|i| i.url()))),
            author: non_empty(itunes.and_then(|i| i.author()))
                .or_else(|| non_empty(channel.managing_editor())),
            website_url: non_empty(Some(channel.link())),
        };

        let items = channel
            .items()
            .iter()
            .map(|item| {
                let itunes = item.itunes_ext();
                RawItem {
                    title: item.title().map(str::to_string),
                    description: item
                        .description()
                        .or_else(|| itunes.and_then(|i| i.summary()))
                        .map(str::to_string),
                    enclosure_url: non_empty(item.enclosure().map(|e| e.url())),
                    guid: non_empty(item.guid().map(|g| g.value())),
                    link: non_empty(item.link()),
                    image_url: non_empty(itunes.and_then(|i| i.image())),
                    duration: itunes.and_then(|i| i.duration()).map(str::to_string),
                    published: non_empty(item.pub_date()).map(RawDate::Text),
                }
            })
            .collect();

        FeedDocument { metadata, items }
    }
}

impl FeedFormat for GenericFormat {
    fn name(&self) -> &'static str {
        "feed-rs"
    }

    fn parse(&self, bytes: &[u8]) -> Result<FeedDocument> {
        let feed: GenericFeed =
            feed_rs::parser::parse(bytes).map_err(|e| AppError::Parse(e.to_string()))?;

        let metadata = FeedMetadata {
            title: non_empty(feed.title.as_ref().map(|t| t.content.as_str())),
            description: non_empty(feed.description.as_ref().map(|t| t.content.as_str())),
            image_url: non_empty(
                feed.logo
                    .as_ref()
                    .or(feed.icon.as_ref())
                    .map(|i| i.uri.as_str()),
            ),
            author: non_empty(feed.authors.first().map(|a| a.name.as_str())),
            website_url: non_empty(
                feed.links
                    .iter()
                    .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                    .map(|l| l.href.as_str()),
            ),
        };

        let items = feed.entries.iter().map(generic_item).collect();

        Ok(FeedDocument { metadata, items })
    }
}

fn generic_item(entry: &Entry) -> RawItem {
    let enclosure_url = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("enclosure"))
        .or_else(|| entry.links.iter().find(|l| is_media_link(l)))
        .map(|l| l.href.clone())
        .or_else(|| {
            entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
        });

    let link = entry
        .links
        .iter()
        .filter(|l| !is_media_link(l))
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .map(|l| l.href.as_str());

    let description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()));

    RawItem {
        title: entry.title.as_ref().map(|t| t.content.clone()),
        description,
        enclosure_url: non_empty(enclosure_url.as_deref()),
        guid: non_empty(Some(entry.id.as_str())),
        link: non_empty(link),
        image_url: entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone())
            .next(),
        duration: entry
            .media
            .iter()
            .find_map(|m| m.duration)
            .map(|d| d.as_secs().to_string()),
        published: entry.published.or(entry.updated).map(RawDate::Parsed),
    }
}

/// JSON Feed attachments arrive as untyped links carrying a media type.
fn is_media_link(link: &Link) -> bool {
    link.media_type
        .as_deref()
        .is_some_and(|t| t.starts_with("audio/") || t.starts_with("video/"))
}
