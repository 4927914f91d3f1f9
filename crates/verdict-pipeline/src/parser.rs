use serde_json::{Map, Value};

use crate::error::DecisionError;

/// Characters of the raw reply kept in a `Format` error.
pub const EXCERPT_CHARS: usize = 500;

/// A decoded flat key/value payload, read as partial `Decision` fields.
pub type Payload = Map<String, Value>;

/// Ways of locating a structured payload inside free text, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// ```` ```json ... ``` ````
    TaggedFence,
    /// Any fence of three or more backticks or tildes.
    GenericFence,
    /// First `{` to last `}`.
    BraceSpan,
    FullText,
}

impl ExtractionStrategy {
    pub const ORDER: [ExtractionStrategy; 4] = [
        ExtractionStrategy::TaggedFence,
        ExtractionStrategy::GenericFence,
        ExtractionStrategy::BraceSpan,
        ExtractionStrategy::FullText,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ExtractionStrategy::TaggedFence => "tagged_fence",
            ExtractionStrategy::GenericFence => "generic_fence",
            ExtractionStrategy::BraceSpan => "brace_span",
            ExtractionStrategy::FullText => "full_text",
        }
    }

    /// Candidate substring for this strategy, if it applies to `text` at all.
    pub fn candidate(self, text: &str) -> Option<&str> {
        match self {
            ExtractionStrategy::TaggedFence => tagged_fence(text),
            ExtractionStrategy::GenericFence => generic_fence(text),
            ExtractionStrategy::BraceSpan => brace_span(text),
            ExtractionStrategy::FullText => Some(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub payload: Payload,
    pub strategy: ExtractionStrategy,
}

/// Extract a structured payload from a model reply.
///
/// Strategies run in [`ExtractionStrategy::ORDER`]; a candidate that does not
/// decode as a JSON object falls through to the next strategy.
pub fn parse_response(text: &str) -> Result<ParsedPayload, DecisionError> {
    ExtractionStrategy::ORDER
        .into_iter()
        .find_map(|strategy| {
            strategy
                .candidate(text)
                .and_then(decode)
                .map(|payload| ParsedPayload { payload, strategy })
        })
        .ok_or_else(|| DecisionError::Format {
            excerpt: excerpt(text),
        })
}

/// First [`EXCERPT_CHARS`] characters of `text`.
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

fn decode(candidate: &str) -> Option<Payload> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn tagged_fence(text: &str) -> Option<&str> {
    const TAG: &str = "```json";
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lowered = text.to_ascii_lowercase();
    let body_start = lowered.find(TAG)? + TAG.len();
    let body_len = text[body_start..].find("```")?;
    Some(&text[body_start..body_start + body_len])
}

fn generic_fence(text: &str) -> Option<&str> {
    let (open, marker) = find_fence_marker(text)?;
    let body_start = open + marker.len();
    let body_len = text[body_start..].find(marker)?;
    Some(skip_language_tag(&text[body_start..body_start + body_len]))
}

/// Position and text of the first run of 3+ backticks or tildes.
fn find_fence_marker(text: &str) -> Option<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'`' || b == b'~' {
            let run = bytes[i..].iter().take_while(|&&c| c == b).count();
            if run >= 3 {
                return Some((i, &text[i..i + run]));
            }
            i += run;
        } else {
            i += 1;
        }
    }
    None
}

fn skip_language_tag(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest)) if is_language_tag(first) => rest,
        _ => body,
    }
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.' | '#'))
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
