#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use podtrack::db::Repository;
use podtrack::feed::FeedSource;
use podtrack::ingest::Ingestor;
use podtrack::{AppError, Result};
use tempfile::TempDir;

pub const FEED_URL: &str = "https://feeds.example.com/systems.xml";

/// Serves feed documents from memory and counts requests.
#[derive(Default)]
pub struct StaticSource {
    feeds: Mutex<HashMap<String, String>>,
    requests: AtomicUsize,
    latency_ms: AtomicU64,
}

impl StaticSource {
    pub fn set(&self, url: &str, body: String) {
        self.feeds.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Delay every subsequent fetch, like a slow server would.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

impl FeedSource for StaticSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let body = self.feeds.lock().unwrap().get(url).cloned();
        body.map(String::into_bytes)
            .ok_or_else(|| AppError::fetch(url, "HTTP 404 Not Found"))
    }
}

pub struct Item<'a> {
    pub guid: &'a str,
    pub title: &'a str,
    pub enclosure: bool,
    pub duration: Option<&'a str>,
    pub pub_date: &'a str,
}

impl<'a> Item<'a> {
    pub fn new(guid: &'a str) -> Self {
        Self {
            guid,
            title: guid,
            enclosure: true,
            duration: None,
            pub_date: "Mon, 01 Jan 2024 10:00:00 GMT",
        }
    }

    pub fn titled(mut self, title: &'a str) -> Self {
        self.title = title;
        self
    }

    pub fn without_enclosure(mut self) -> Self {
        self.enclosure = false;
        self
    }

    pub fn duration(mut self, duration: &'a str) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn published(mut self, pub_date: &'a str) -> Self {
        self.pub_date = pub_date;
        self
    }
}

/// Build a podcast RSS document with the iTunes namespace.
pub fn rss(title: &str, description: Option<&str>, items: &[Item]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
<channel>
"#,
    );
    xml.push_str(&format!("<title>{title}</title>\n"));
    xml.push_str("<link>https://systems.example.com</link>\n");
    match description {
        Some(description) => xml.push_str(&format!("<description>{description}</description>\n")),
        None => xml.push_str("<description></description>\n"),
    }
    xml.push_str("<itunes:author>Ada Host</itunes:author>\n");
    xml.push_str(r#"<itunes:image href="https://systems.example.com/art.jpg"/>"#);
    xml.push('\n');

    for item in items {
        xml.push_str("<item>\n");
        xml.push_str(&format!("<title>{}</title>\n", item.title));
        xml.push_str(&format!(
            "<description>&lt;p&gt;About {}&lt;/p&gt;</description>\n",
            item.title
        ));
        xml.push_str(&format!("<guid isPermaLink=\"false\">{}</guid>\n", item.guid));
        xml.push_str(&format!("<pubDate>{}</pubDate>\n", item.pub_date));
        if item.enclosure {
            xml.push_str(&format!(
                "<enclosure url=\"https://cdn.example.com/{}.mp3\" length=\"1024\" type=\"audio/mpeg\"/>\n",
                item.guid
            ));
        }
        if let Some(duration) = item.duration {
            xml.push_str(&format!("<itunes:duration>{duration}</itunes:duration>\n"));
        }
        xml.push_str("</item>\n");
    }

    xml.push_str("</channel>\n</rss>\n");
    xml
}

pub struct Harness {
    pub ingestor: Ingestor<StaticSource>,
    pub repository: Repository,
    db_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("podcasts.db");
        let repository = Repository::new(db_path.to_str().unwrap()).await.unwrap();
        let ingestor = Ingestor::new(repository.clone(), StaticSource::default());
        Self {
            ingestor,
            repository,
            db_path,
            _dir: dir,
        }
    }

    /// Rebuild the ingestor with the given batch limits, keeping its source.
    pub fn set_limits(&mut self, max_concurrent: usize, feed_timeout: Duration) {
        let ingestor = std::mem::replace(
            &mut self.ingestor,
            Ingestor::new(self.repository.clone(), StaticSource::default()),
        );
        self.ingestor = ingestor.with_limits(max_concurrent, feed_timeout);
    }

    pub fn source(&self) -> &StaticSource {
        self.ingestor.source()
    }

    /// Count rows in `table` matching `column = value`, bypassing the repository.
    pub fn count_rows(&self, table: &str, column: &str, value: i64) -> i64 {
        let conn = rusqlite::Connection::open(&self.db_path).unwrap();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1"),
            [value],
            |row| row.get(0),
        )
        .unwrap()
    }
}
