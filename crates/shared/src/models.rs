use serde::{Deserialize, Serialize};

/// Placeholder used when a feed entry carries no publication date
pub const UNKNOWN_PUBLISHED: &str = "N/A";

/// A headline as it came out of a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub link: String,
    pub published: String,
}

impl ArticleRecord {
    pub fn new(title: impl Into<String>, link: impl Into<String>, published: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            published: published.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.title.split_whitespace().count()
    }
}

/// One member headline of a selected cluster.
///
/// `rank` 0 is the most covered story. `resolved_link` is filled in during
/// content resolution when the original link pointed at an aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub rank: usize,
    pub title: String,
    pub link: String,
    pub resolved_link: Option<String>,
}

impl ClusterRow {
    pub fn new(rank: usize, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            rank,
            title: title.into(),
            link: link.into(),
            resolved_link: None,
        }
    }

    /// The link an article body should be fetched from
    pub fn fetch_link(&self) -> &str {
        self.resolved_link.as_deref().unwrap_or(&self.link)
    }
}

/// Rows of all selected clusters, grouped by ascending rank
pub type ClusterSelection = Vec<ClusterRow>;

/// Concatenated article text for one rank, ready to be summarized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryMaterial {
    pub rank: usize,
    pub text: String,
    pub links: Vec<String>,
}

impl StoryMaterial {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            ..Default::default()
        }
    }

    pub fn push_article(&mut self, title: &str, body: &str, link: &str) {
        self.text.push_str("Τίτλος: ");
        self.text.push_str(title);
        self.text.push('\n');
        self.text.push_str(body);
        self.text.push('\n');
        self.links.push(link.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// A finished story of the bulletin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySegment {
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
}
