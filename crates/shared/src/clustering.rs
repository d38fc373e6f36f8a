use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::{Config, MatchPolicy, MIN_TITLE_WORDS};
use crate::error::OracleError;
use crate::judge::{Grade, SimilarityJudge};
use crate::models::{ArticleRecord, ClusterRow, ClusterSelection};

/// Disjoint-set forest over article indices.
///
/// A union always keeps the absorbing root, so a live set's root is the
/// index of its first-discovered headline and its member list preserves
/// discovery order.
#[derive(Debug, Clone)]
pub struct DisjointSets {
    parent: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl DisjointSets {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            members: (0..len).map(|i| vec![i]).collect(),
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        // Path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }

        root
    }

    pub fn is_root(&self, x: usize) -> bool {
        self.parent[x] == x
    }

    /// Move every member of `absorb`'s set to the end of `keep`'s set.
    ///
    /// Returns false when both already share a set.
    pub fn union_into(&mut self, keep: usize, absorb: usize) -> bool {
        let keep = self.find(keep);
        let absorb = self.find(absorb);
        if keep == absorb {
            return false;
        }

        let moved = std::mem::take(&mut self.members[absorb]);
        self.members[keep].extend(moved);
        self.parent[absorb] = keep;
        true
    }

    /// Members of the set rooted at `root`, in discovery order
    pub fn members(&self, root: usize) -> &[usize] {
        &self.members[root]
    }

    /// Live roots in discovery order
    pub fn roots(&self) -> Vec<usize> {
        (0..self.parent.len()).filter(|&i| self.is_root(i)).collect()
    }
}

/// Headlines believed to report the same story
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    pub members: Vec<String>,
}

impl CandidateSet {
    pub fn representative(&self) -> &str {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of one clustering run
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    /// Live sets in discovery order
    pub sets: Vec<CandidateSet>,
    pub selection: ClusterSelection,
    pub comparisons: usize,
    pub merges: usize,
    /// Initial `n·(n-1)/2` estimate shown on the progress bar
    pub estimated_comparisons: usize,
}

/// Last grade seen for an unordered pair of representatives
#[derive(Debug, Default)]
struct PairScores {
    scores: HashMap<(String, String), Grade>,
}

impl PairScores {
    fn contains(&self, a: &str, b: &str) -> bool {
        self.scores.contains_key(&(a.to_string(), b.to_string()))
            || self.scores.contains_key(&(b.to_string(), a.to_string()))
    }

    fn insert(&mut self, a: &str, b: &str, grade: Grade) {
        self.scores.insert((a.to_string(), b.to_string()), grade);
    }
}

pub struct StoryClusterer<'a> {
    judge: SimilarityJudge<'a>,
    policy: MatchPolicy,
    story_limit: usize,
    min_title_words: usize,
    show_progress: bool,
}

impl<'a> StoryClusterer<'a> {
    pub fn new(judge: SimilarityJudge<'a>, config: &Config) -> Self {
        Self {
            judge,
            policy: config.match_policy,
            story_limit: config.story_limit,
            min_title_words: MIN_TITLE_WORDS,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Group headlines that the judge considers the same story and pick the
    /// most covered groups.
    ///
    /// Every unordered pair of live representatives is judged at most once.
    /// A match merges the second set into the first; scanning continues
    /// until a full pass produces no merge.
    pub async fn cluster(&self, records: &[ArticleRecord]) -> Result<ClusterOutcome, OracleError> {
        let candidates: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.word_count() > self.min_title_words)
            .map(|(idx, _)| idx)
            .collect();

        let n = candidates.len();
        let estimated_comparisons = n * n.saturating_sub(1) / 2;
        let title = |slot: usize| records[candidates[slot]].title.as_str();

        let progress = self.progress_bar(estimated_comparisons as u64);
        let mut sets = DisjointSets::new(n);
        let mut scores = PairScores::default();
        let mut comparisons = 0;
        let mut merges = 0;

        loop {
            let mut merged_this_pass = 0;
            let roots = sets.roots();

            for &i in &roots {
                for &j in &roots {
                    if i == j || !sets.is_root(i) || !sets.is_root(j) {
                        continue;
                    }

                    let (rep_i, rep_j) = (title(i), title(j));
                    if scores.contains(rep_i, rep_j) {
                        continue;
                    }

                    let grade = self.judge.judge(rep_i, rep_j).await?;
                    comparisons += 1;
                    progress.inc(1);

                    let matched = grade.is_match(self.policy);
                    debug!(grade = grade.reply(), matched, "{} <> {}", rep_i, rep_j);
                    scores.insert(rep_i, rep_j, grade);

                    if matched {
                        sets.union_into(i, j);
                        merged_this_pass += 1;
                    }
                }
            }

            merges += merged_this_pass;
            if merged_this_pass == 0 {
                break;
            }
        }

        progress.finish_and_clear();

        let live: Vec<CandidateSet> = sets
            .roots()
            .into_iter()
            .map(|root| CandidateSet {
                members: sets
                    .members(root)
                    .iter()
                    .map(|&slot| records[candidates[slot]].title.clone())
                    .collect(),
            })
            .collect();

        let selection = select_clusters(records, &live, self.story_limit);

        info!(
            headlines = n,
            comparisons,
            estimated_comparisons,
            merges,
            groups = live.len(),
            "Clustering finished"
        );

        Ok(ClusterOutcome {
            sets: live,
            selection,
            comparisons,
            merges,
            estimated_comparisons,
        })
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/~{len} ({elapsed})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message("Grouping headlines");
        bar
    }
}

/// Pick the `story_limit` largest sets with at least two members and turn
/// every member into a row tagged with its set's rank.
///
/// Sets are stably sorted by size and walked from the largest, so among
/// equally sized sets the later-discovered one ranks first. A member's link
/// is the link of the first record carrying that exact title.
pub fn select_clusters(
    records: &[ArticleRecord],
    sets: &[CandidateSet],
    story_limit: usize,
) -> ClusterSelection {
    let mut first_by_title: HashMap<&str, &str> = HashMap::new();
    for record in records {
        first_by_title
            .entry(record.title.as_str())
            .or_insert(record.link.as_str());
    }

    let mut ordered: Vec<&CandidateSet> = sets.iter().collect();
    ordered.sort_by_key(|set| set.len());

    let mut rows = Vec::new();
    for (rank, set) in ordered
        .into_iter()
        .rev()
        .take(story_limit)
        .take_while(|set| set.len() >= 2)
        .enumerate()
    {
        for member in &set.members {
            // Members are record titles, so the lookup always finds one
            let link = first_by_title.get(member.as_str()).copied().unwrap_or_default();
            rows.push(ClusterRow::new(rank, member.clone(), link));
        }
    }

    rows
}
