//! Core data model shared by the pipeline stages.
//!
//! - `FunctionRecord`: one decompiled function loaded from disk
//! - `ScoreResult`: a model verdict for one function
//! - `Tier`: presentation bucket of a score relative to the current maximum

use serde::{Deserialize, Serialize};

/// Highest score the model may assign.
pub const MAX_SCORE: u8 = 10;

/// A single decompiled function, as recovered from an artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub binary_name: String,
    pub function_name: String,
    pub code: String,
}

impl FunctionRecord {
    pub fn new(
        binary_name: impl Into<String>,
        function_name: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            binary_name: binary_name.into(),
            function_name: function_name.into(),
            code: code.into(),
        }
    }
}

/// Model verdict for one function.
///
/// `explanation` is always empty when `score == 0`; use [`ScoreResult::new`]
/// to keep that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub binary_name: String,
    pub function_name: String,
    pub score: u8,
    pub explanation: String,
}

impl ScoreResult {
    pub fn new(record: &FunctionRecord, score: u8, explanation: impl Into<String>) -> Self {
        let explanation = if score == 0 { String::new() } else { explanation.into() };
        Self {
            binary_name: record.binary_name.clone(),
            function_name: record.function_name.clone(),
            score,
            explanation,
        }
    }
}

/// Severity bucket of a score relative to the highest score seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Top,
    Mid,
    Low,
}

impl Tier {
    /// Classify `score` against `max_score`.
    ///
    /// `>= 75%` of the max is `Top`, `>= 50%` is `Mid`, anything else is `Low`.
    /// Both boundaries are inclusive and computed in integers.
    pub fn classify(score: u8, max_score: u8) -> Self {
        let (score, max) = (u32::from(score), u32::from(max_score));
        if score * 4 >= max * 3 {
            Tier::Top
        } else if score * 2 >= max {
            Tier::Mid
        } else {
            Tier::Low
        }
    }
}
