//! Parsing of estimator completions
//!
//! Completions are untrusted free text: the plan may be wrapped in a markdown
//! code fence or surrounded by prose. We take the first balanced top-level
//! JSON object and deserialize it leniently; repair and validation happen in
//! [`crate::validate`].

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no JSON object found in completion")]
    NoJson,

    #[error("invalid plan JSON: {0}")]
    Json(String),
}

/// Segment as the estimator reports it. `clipIndex` may be out of range or negative.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub clip_index: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEffectTiming {
    pub time: f64,
    pub effect: String,
    pub intensity: f64,
}

/// Plan as the estimator reports it, before repair
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlan {
    pub bpm: f64,
    #[serde(default)]
    pub total_duration: Option<f64>,
    pub beats: Vec<f64>,
    #[serde(default)]
    pub hard_beats: Option<Vec<f64>>,
    pub segments: Vec<RawSegment>,
    #[serde(alias = "effects")]
    pub effect_timings: Vec<RawEffectTiming>,
}

/// Parse a completion into a [`RawPlan`].
pub fn parse_completion(text: &str) -> Result<RawPlan, ParseError> {
    let body = strip_code_fences(text);
    let json = extract_json_object(body).ok_or(ParseError::NoJson)?;
    serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))
}

/// Contents of the first ``` fenced block, or the trimmed text if there is none.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after_open = &trimmed[open + 3..];
    // Skip the info string ("json", "JSON", ...) on the opening line
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open,
    };

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// First balanced `{...}` in `text`. Braces inside string literals are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
