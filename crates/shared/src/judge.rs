use crate::config::MatchPolicy;
use crate::error::OracleError;
use crate::oracle::{ChatMessage, Oracle};

/// Grade that marks two headlines as the same story
pub const MATCH_GRADE: u32 = 9;

/// Whole-reply form some models answer with, accepted by the legacy policy
const LEGACY_LABELLED_MATCH: &str = "Βαθμός: 9";

/// A similarity reply as the oracle gave it.
///
/// The legacy parse only ever looks at the first character; the full reply
/// is kept so the tolerant parse and the labelled form can be checked too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    reply: String,
}

impl Grade {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// First character of the raw reply
    pub fn leading(&self) -> Option<char> {
        self.reply.chars().next()
    }

    /// First integer in the reply, clamped to 0..=9
    pub fn score(&self) -> Option<u32> {
        let digits: String = self
            .reply
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();

        if digits.is_empty() {
            return None;
        }

        // Saturate very long digit runs instead of failing to parse them
        Some(digits.parse::<u64>().map_or(MATCH_GRADE, |n| n.min(MATCH_GRADE as u64) as u32))
    }

    pub fn is_match(&self, policy: MatchPolicy) -> bool {
        match policy {
            MatchPolicy::Legacy => {
                self.leading() == Some('9') || self.reply == LEGACY_LABELLED_MATCH
            }
            MatchPolicy::Tolerant => self.score() == Some(MATCH_GRADE),
        }
    }
}

/// Asks the oracle how similar two headlines are
pub struct SimilarityJudge<'a> {
    oracle: &'a dyn Oracle,
    model: String,
}

impl<'a> SimilarityJudge<'a> {
    pub fn new(oracle: &'a dyn Oracle, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    pub fn prompt(title_a: &str, title_b: &str) -> String {
        format!(
            "Βαθμολόγησε από το 0 ως το 9 την ομοιότητα των δυο παρακάτω τίτλων. \
             Τίτλος 1: {}, Τίτλος 2: {}\n\
             Απάντησε μόνο με το βαθμό.\n\n Βαθμός:",
            title_a, title_b
        )
    }

    pub async fn judge(&self, title_a: &str, title_b: &str) -> Result<Grade, OracleError> {
        let messages = [ChatMessage::user(Self::prompt(title_a, title_b))];
        let reply = self.oracle.chat(&self.model, &messages).await?;
        Ok(Grade::new(reply))
    }
}
