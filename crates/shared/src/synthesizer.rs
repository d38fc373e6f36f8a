use std::collections::BTreeSet;
use std::io::Write;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::OracleError;
use crate::extractor::ContentResolver;
use crate::models::{ClusterRow, StoryMaterial, StorySegment};
use crate::oracle::{ChatMessage, Oracle};

/// Number of stories to synthesize for a selection.
///
/// Two rows are held back from the row count (never going below zero) and
/// the result can't exceed the number of ranks actually present.
pub fn story_count(rows: &[ClusterRow], story_limit: usize) -> usize {
    let ranks: BTreeSet<usize> = rows.iter().map(|row| row.rank).collect();
    story_limit
        .min(rows.len().saturating_sub(2))
        .min(ranks.len())
}

/// Cut `text` to at most `max_chars` characters; 0 leaves it untouched
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub fn summary_prompt(text: &str) -> String {
    format!(
        "Με βάση τα ακόλουθα άρθρα, δημιούργησε μια περίληψη 2-3 παραγράφων διατηρώντας ενημερωτικό και ουδέτερο χαρακτήρα.:\n\n{}\n\nΠερίληψη:",
        text
    )
}

pub fn title_prompt(summary: &str) -> String {
    format!(
        "Δώσε μου ένα σύντομο τίτλο για το ακόλουθο κείμενο. Η απάντηση να περιέχει μόνο τον τίτλο.\n\n Κείμενο:{}.\n",
        summary
    )
}

/// Turns the selected clusters into finished bulletin stories
pub struct BroadcastSynthesizer<'a> {
    oracle: &'a dyn Oracle,
    model: String,
    story_limit: usize,
    prompt_char_budget: usize,
}

impl<'a> BroadcastSynthesizer<'a> {
    pub fn new(oracle: &'a dyn Oracle, config: &Config) -> Self {
        Self {
            oracle,
            model: config.broadcast_model.clone(),
            story_limit: config.story_limit,
            prompt_char_budget: config.prompt_char_budget,
        }
    }

    /// Resolve, summarize and title each rank in order.
    ///
    /// Ranks whose members all failed to download are skipped without
    /// asking the model; a story whose summary or title call fails is
    /// logged and left out.
    pub async fn synthesize(
        &self,
        resolver: &ContentResolver,
        rows: &mut [ClusterRow],
    ) -> Vec<StorySegment> {
        let count = story_count(rows, self.story_limit);
        info!(stories = count, rows = rows.len(), "Synthesizing stories");

        let mut segments = Vec::with_capacity(count);
        for rank in 0..count {
            let material = resolver.gather(rows, rank).await;

            match self.compose(&material).await {
                Ok(Some(segment)) => segments.push(segment),
                Ok(None) => warn!(rank, "No article text could be fetched, skipping story"),
                Err(e) => warn!(rank, error = %e, "Model call failed, skipping story"),
            }

            eprint!(".");
            let _ = std::io::stderr().flush();
        }
        eprintln!();

        segments
    }

    /// Summary call, then title call, for one rank's material
    pub async fn compose(&self, material: &StoryMaterial) -> Result<Option<StorySegment>, OracleError> {
        if material.is_empty() {
            return Ok(None);
        }

        let text = truncate_chars(&material.text, self.prompt_char_budget);
        if text.len() < material.text.len() {
            info!(
                rank = material.rank,
                chars = material.text.chars().count(),
                budget = self.prompt_char_budget,
                "Truncated story material"
            );
        }

        let summary = self
            .oracle
            .chat(&self.model, &[ChatMessage::user(summary_prompt(text))])
            .await?;
        let title = self
            .oracle
            .chat(&self.model, &[ChatMessage::user(title_prompt(&summary))])
            .await?;

        Ok(Some(StorySegment {
            title: title.trim().to_string(),
            text: summary.trim().to_string(),
            links: material.links.clone(),
        }))
    }
}
