//! Post-processing: deterministic cleanup of raw model text before parsing.
//!
//! Even when told to "return only the JSON object", chat models regularly
//! wrap the object in a ```` ```json ```` fence, or emit a byte-order mark or
//! zero-width characters picked up from their training data. None of this is
//! part of the answer, so it is removed here before [`crate::feedback::parse`]
//! sees the text.
//!
//! The rules touch only the wrapping. The object itself is never repaired:
//! a truncated or malformed answer must still fail schema validation.
//!
//! ## Rule Order
//!
//! Invisible characters go first because a BOM in front of a fence would
//! otherwise stop the fence pattern from matching at the start.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model response.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (BOM, zero-width spaces and joiners)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip one outer code fence, with or without a language tag
/// 4. Trim surrounding whitespace
pub fn clean_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_outer_fence(s.trim());
    s.trim().to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
            )
        })
        .collect()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer fence ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n?(.*?)\n?```$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}
