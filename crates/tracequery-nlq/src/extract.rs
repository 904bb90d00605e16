//! Recover a JSON object from noisy model output.
//!
//! Small local models often wrap JSON in markdown fences or surround it with
//! prose. Extraction tries a fixed list of strategies in order and keeps the
//! first candidate that is syntactically valid JSON; arbitrary text is never
//! coerced into an object.

use std::sync::OnceLock;

use regex::Regex;

type Extractor = fn(&str) -> Option<&str>;

/// Strategies in priority order. Each only proposes a candidate; validity is
/// checked once in [`extract_json`].
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("whole", whole_response),
    ("fenced", fenced_block),
    ("brace_span", brace_span),
];

/// A JSON object found in a model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted<'a> {
    pub json: &'a str,
    /// Name of the strategy that produced it.
    pub strategy: &'static str,
}

/// Extract the first valid JSON object candidate from `response`.
pub fn extract_json(response: &str) -> Option<Extracted<'_>> {
    let response = response.trim();
    EXTRACTORS.iter().find_map(|&(strategy, extractor)| {
        extractor(response)
            .filter(|candidate| is_valid_json(candidate))
            .map(|json| Extracted { json, strategy })
    })
}

fn is_valid_json(candidate: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(candidate).is_ok()
}

fn whole_response(response: &str) -> Option<&str> {
    (response.starts_with('{') && response.ends_with('}')).then_some(response)
}

fn fenced_block(response: &str) -> Option<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.+?\})\s*```").expect("fence pattern is valid")
    });
    re.captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn brace_span(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

/// Shorten `s` to at most `max_chars` characters for diagnostics, appending
/// `...` when something was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
