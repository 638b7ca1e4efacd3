use crate::{search::DocEntry, similarity};

/// Minimum fuzzy similarity an entry needs to be kept.
pub const DEFAULT_FUZZY_THRESHOLD: u32 = 60;

/// Types that get a bonus in heuristic ranking.
const PRIVILEGED_TYPES: &[&str] = &["function", "method", "class"];

/// Docsets that get a bonus in heuristic ranking.
const POPULAR_DOCSETS: &[&str] = &["python", "javascript", "react", "nodejs"];

const EXACT_BONUS: u32 = 100;
const SUBSTRING_BONUS: u32 = 50;
const PREFIX_BONUS: u32 = 30;
const TYPE_BONUS: u32 = 10;
const POPULARITY_BONUS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMode {
    /// Approximate similarity of the query against name, type and docset.
    Fuzzy,
    /// Additive score from exact, prefix, type and popularity signals.
    Heuristic,
}

impl RankMode {
    pub fn from_flag(use_fuzzy: bool) -> Self {
        if use_fuzzy { Self::Fuzzy } else { Self::Heuristic }
    }
}

/// An entry paired with the score it was ranked by.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub entry: DocEntry,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct RankingEngine {
    fuzzy_threshold: u32,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl RankingEngine {
    pub fn new(fuzzy_threshold: u32) -> Self {
        Self { fuzzy_threshold }
    }

    /// Score and order `entries`, best first. Ties keep input order.
    pub fn rank(
        &self,
        query: &str,
        entries: Vec<DocEntry>,
        mode: RankMode,
    ) -> Vec<RankedEntry> {
        match mode {
            RankMode::Fuzzy => self.fuzzy(query, entries),
            RankMode::Heuristic => heuristic(query, entries),
        }
    }

    /// Keep entries whose `"{name} {type} {docset}"` string is at least
    /// `fuzzy_threshold` similar to the query.
    pub fn fuzzy(&self, query: &str, entries: Vec<DocEntry>) -> Vec<RankedEntry> {
        if entries.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<RankedEntry> = entries
            .into_iter()
            .filter_map(|entry| {
                let searchable =
                    format!("{} {} {}", entry.name, entry.kind, entry.docset);
                let score = similarity::weighted_ratio(query, &searchable);
                (score >= self.fuzzy_threshold)
                    .then_some(RankedEntry { entry, score })
            })
            .collect();

        sort_by_score(&mut ranked);
        ranked
    }
}

/// Heuristic score of one entry.
///
/// An exact (case-insensitive) name match earns 100 and, being a prefix
/// too, 30 more. A non-exact prefix earns only the 30; the 50 substring
/// bonus is for matches inside the name.
pub fn heuristic_score(query: &str, entry: &DocEntry) -> u32 {
    let query = query.to_lowercase();
    let name = entry.name.to_lowercase();
    let is_prefix = name.starts_with(&query);

    let mut score = 0;
    if name == query {
        score += EXACT_BONUS;
    } else if !is_prefix && name.contains(&query) {
        score += SUBSTRING_BONUS;
    }

    if is_prefix {
        score += PREFIX_BONUS;
    }

    let kind = entry.kind.to_lowercase();
    if PRIVILEGED_TYPES.contains(&kind.as_str()) {
        score += TYPE_BONUS;
    }

    let docset = entry.docset.to_lowercase();
    if POPULAR_DOCSETS.contains(&docset.as_str()) {
        score += POPULARITY_BONUS;
    }

    score
}

pub fn heuristic(query: &str, entries: Vec<DocEntry>) -> Vec<RankedEntry> {
    let mut ranked: Vec<RankedEntry> = entries
        .into_iter()
        .map(|entry| RankedEntry {
            score: heuristic_score(query, &entry),
            entry,
        })
        .collect();

    sort_by_score(&mut ranked);
    ranked
}

fn sort_by_score(ranked: &mut [RankedEntry]) {
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
}
