use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BROWSER_USER_AGENT;
use crate::error::ConfigError;
use crate::models::{ArticleRecord, UNKNOWN_PUBLISHED};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Default, Deserialize)]
struct FeedsFile {
    #[serde(default)]
    feeds: Option<Vec<String>>,
}

/// Read the list of feed URLs from a YAML file with a top-level `feeds:` key.
///
/// A missing file, an empty document or a missing key all mean "no feeds".
pub fn load_feeds(path: &Path) -> Result<Vec<String>, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "Feed file not found");
        return Ok(Vec::new());
    }

    let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode_feed_file(&bytes);

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    if document.is_null() {
        return Ok(Vec::new());
    }

    let parsed: FeedsFile =
        serde_yaml::from_value(document).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(parsed.feeds.unwrap_or_default())
}

/// UTF-8 (with or without BOM), falling back to Latin-1
fn decode_feed_file(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

pub struct FeedFetcher {
    client: Client,
    show_progress: bool,
}

impl FeedFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            show_progress: true,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Fetch every feed in order and keep at most `max_per_feed` entries of each.
    ///
    /// A feed that cannot be downloaded or parsed is logged and skipped.
    pub async fn fetch_articles(&self, urls: &[String], max_per_feed: usize) -> Vec<ArticleRecord> {
        let bar = self.progress_bar(urls.len() as u64);
        let mut records = Vec::new();

        for url in urls {
            match self.fetch_feed(url, max_per_feed).await {
                Ok(entries) => {
                    info!(url = %url, entries = entries.len(), "Feed parsed");
                    records.extend(entries);
                }
                Err(e) => {
                    warn!(url = %url, error = %format!("{:#}", e), "Skipping feed");
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        records
    }

    async fn fetch_feed(&self, url: &str, max_per_feed: usize) -> Result<Vec<ArticleRecord>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Feed request failed")?
            .error_for_status()
            .context("Feed returned an error status")?;

        let bytes = response.bytes().await.context("Failed to read feed body")?;
        let feed = feed_rs::parser::parse(&bytes[..]).context("Failed to parse feed")?;

        let records = feed
            .entries
            .into_iter()
            .take(max_per_feed)
            .filter_map(|entry| {
                let title = entry.title.map(|t| t.content).filter(|t| !t.trim().is_empty())?;
                let link = entry.links.first().map(|l| l.href.clone())?;
                let published = entry
                    .published
                    .map(|dt| dt.to_rfc2822())
                    .unwrap_or_else(|| UNKNOWN_PUBLISHED.to_string());

                Some(ArticleRecord::new(title, link, published))
            })
            .collect();

        Ok(records)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40.green/white}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message("Fetching feeds");
        bar
    }
}
