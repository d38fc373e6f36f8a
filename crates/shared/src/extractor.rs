use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BROWSER_USER_AGENT;
use crate::error::{FetchError, ResolveError};
use crate::models::{ClusterRow, StoryMaterial};
use crate::redirect::{is_aggregator_link, GoogleNewsDecoder};

/// Pages with less extracted text than this are treated as failed downloads
const MIN_ARTICLE_CHARS: usize = 100;

/// Paragraphs shorter than this are usually bylines, captions or share buttons
const MIN_PARAGRAPH_CHARS: usize = 30;

/// Downloads article bodies for cluster members, one at a time
pub struct ContentResolver {
    client: Client,
    decoder: GoogleNewsDecoder,
}

impl ContentResolver {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        let decoder = GoogleNewsDecoder::new(client.clone());

        Ok(Self { client, decoder })
    }

    pub fn with_decoder(mut self, decoder: GoogleNewsDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Resolve aggregator links in place, then fetch the body text
    pub async fn resolve(&self, row: &mut ClusterRow) -> Result<String, ResolveError> {
        if is_aggregator_link(&row.link) {
            let decoded = self.decoder.decode(&row.link).await?;
            row.resolved_link = Some(decoded);
        }

        let text = self.fetch_article_content(row.fetch_link()).await?;
        Ok(text)
    }

    pub async fn fetch_article_content(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let html = response.text().await?;
        let text = extract_article_text(&html);

        if text.trim().is_empty() || text.chars().count() < MIN_ARTICLE_CHARS {
            return Err(FetchError::Empty);
        }

        Ok(text)
    }

    /// Gather text for every row of `rank`.
    ///
    /// A member whose link cannot be decoded or fetched is logged and left
    /// out; the remaining members still contribute.
    pub async fn gather(&self, rows: &mut [ClusterRow], rank: usize) -> StoryMaterial {
        let mut material = StoryMaterial::new(rank);

        for row in rows.iter_mut().filter(|row| row.rank == rank) {
            match self.resolve(row).await {
                Ok(body) => {
                    debug!(rank, url = row.fetch_link(), chars = body.len(), "Fetched article");
                    material.push_article(&row.title, &body, &row.link);
                }
                Err(e) => {
                    warn!(rank, url = %row.link, error = %e, "Skipping article");
                }
            }
        }

        material
    }
}

/// Pull readable body text out of an article page.
///
/// Paragraphs inside `<article>` win; otherwise all substantial `<p>`
/// elements are used, and as a last resort the whole page is rendered to
/// plain text.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in ["article p", "p"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        let paragraphs: Vec<String> = document
            .select(&selector)
            .map(|p| normalize_whitespace(&p.text().collect::<String>()))
            .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
            .collect();

        let text = paragraphs.join("\n\n");
        if text.chars().count() >= MIN_ARTICLE_CHARS {
            return text;
        }
    }

    html2text::from_read(html.as_bytes(), 100)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
