use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::model::MAX_SCORE;

/// Model output that does not start with a usable score.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreParseError {
    #[error("model response was empty")]
    Empty,
    #[error("first line '{0}' is not an integer score")]
    NotAnInteger(String),
    #[error("score {0} is outside 0..=10")]
    OutOfRange(i64),
}

fn instruction_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // (?s) lets the span cross newlines, the prompt itself is multi-line.
    RE.get_or_init(|| Regex::new(r"(?s)\[INST\].*?\[/INST\]").expect("valid instruction regex"))
}

/// Strip echoed instructions, sequence markers and the `Explanation:` label.
pub fn clean_response(raw: &str) -> String {
    instruction_span()
        .replace_all(raw, "")
        .replace("<s>", "")
        .replace("</s>", "")
        .replace("Explanation:", "")
        .trim()
        .to_string()
}

/// Split a cleaned response into `(score, explanation)`.
///
/// The first line must be an integer in `0..=10`. Remaining non-blank lines
/// are trimmed and joined with a space. A zero score always comes back with an
/// empty explanation.
pub fn parse_response(cleaned: &str) -> Result<(u8, String), ScoreParseError> {
    let mut lines = cleaned.lines();
    let first = lines.next().map(str::trim).unwrap_or_default();
    if first.is_empty() {
        return Err(ScoreParseError::Empty);
    }
    let value: i64 = first.parse().map_err(|_| ScoreParseError::NotAnInteger(first.to_string()))?;
    let score = u8::try_from(value)
        .ok()
        .filter(|s| *s <= MAX_SCORE)
        .ok_or(ScoreParseError::OutOfRange(value))?;

    if score == 0 {
        return Ok((0, String::new()));
    }
    let explanation =
        lines.map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
    Ok((score, explanation))
}
