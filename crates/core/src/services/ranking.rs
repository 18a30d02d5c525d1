//! Ranking of score results and its presentation-only rendering.
//!
//! [`RankingTable`] stores results exactly as received. [`render`] derives the
//! sorted, tiered view from them each time; tiers never flow back into the
//! stored data.

use serde::Serialize;

use crate::model::{ScoreResult, Tier};

/// Fixed caption identifying the tool.
pub const CAPTION: &str = "Monocle";

pub const COLUMNS: [&str; 4] = ["BINARY NAME", "FUNCTION NAME", "SCORE", "EXPLANATION"];

/// One display row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedRow {
    pub binary_name: String,
    pub function_name: String,
    pub score: u8,
    pub explanation: String,
    pub tier: Tier,
}

/// Full snapshot handed to a display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTable {
    pub title: String,
    pub caption: String,
    pub columns: Vec<String>,
    pub max_score: u8,
    pub rows: Vec<RankedRow>,
}

/// Capitalize each whitespace-separated word: `"rc4 KEY setup"` -> `"Rc4 Key Setup"`.
pub fn format_title(description: &str) -> String {
    description
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Sort `results` by score descending and tier every row against the current maximum.
///
/// The sort is stable, so equal scores keep arrival order and rendering the
/// same data twice gives the same table.
pub fn render(results: &[ScoreResult], description: &str) -> RenderedTable {
    let mut sorted: Vec<&ScoreResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));
    let max_score = sorted.first().map(|r| r.score).unwrap_or(0);

    let rows = sorted
        .into_iter()
        .map(|r| RankedRow {
            binary_name: r.binary_name.clone(),
            function_name: r.function_name.clone(),
            score: r.score,
            explanation: r.explanation.clone(),
            tier: Tier::classify(r.score, max_score),
        })
        .collect();

    RenderedTable {
        title: format_title(description),
        caption: CAPTION.to_string(),
        columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        max_score,
        rows,
    }
}

/// Append-only collection of results for one search.
#[derive(Debug, Clone, Default)]
pub struct RankingTable {
    description: String,
    results: Vec<ScoreResult>,
}

impl RankingTable {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), results: Vec::new() }
    }

    /// Record a result and return the refreshed table.
    pub fn push(&mut self, result: ScoreResult) -> RenderedTable {
        self.results.push(result);
        self.render()
    }

    pub fn render(&self) -> RenderedTable {
        render(&self.results, &self.description)
    }

    /// Results in arrival order.
    pub fn results(&self) -> &[ScoreResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Display surface that receives the full table after every new result.
pub trait TableSink {
    fn publish(&mut self, table: &RenderedTable);
}

/// Sink that discards every table.
#[derive(Debug, Default)]
pub struct NullSink;

impl TableSink for NullSink {
    fn publish(&mut self, _table: &RenderedTable) {}
}

impl<F> TableSink for F
where
    F: FnMut(&RenderedTable),
{
    fn publish(&mut self, table: &RenderedTable) {
        self(table)
    }
}
