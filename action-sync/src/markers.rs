//! ACTION marker extraction and the pure decisions the sync passes make.
//!
//! Markers look like `ACTION: <phrase>` (keyword matched case-insensitively).
//! A phrase runs until the next keyword or the end of its line; a hyphen used
//! as a separator before the next marker is dropped. Once the matching
//! tracking entry is completed the marker is rewritten as `✅ ACTION: <phrase>`.

use chrono::{DateTime, NaiveDate, Utc};
use regex::{NoExpand, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Keyword that opens a marker, as written back into notes
pub const ACTION_KEYWORD: &str = "ACTION:";
/// Glyph prefixed to a marker whose tracking entry is done
pub const COMPLETED_MARKER: &str = "✅";

static ACTION_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ACTION:").unwrap());

/// Extract ACTION phrases from note text, in order of appearance.
///
/// Repeats are kept; dedup happens against existing tracking entries only.
pub fn extract_markers(text: &str) -> Vec<String> {
    let keywords: Vec<(usize, usize)> = ACTION_KEYWORD_RE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut phrases = Vec::new();
    for (i, &(_, body_start)) in keywords.iter().enumerate() {
        let body_end = keywords
            .get(i + 1)
            .map(|&(next_start, _)| next_start)
            .unwrap_or(text.len());

        if let Some(phrase) = clean_phrase(&text[body_start..body_end]) {
            phrases.push(phrase);
        }
    }

    log::debug!("[MARKERS] Extracted {} action items from text", phrases.len());
    phrases
}

/// Reduce the text between two keywords to the phrase itself
fn clean_phrase(segment: &str) -> Option<String> {
    // Whitespace (including a line break) may sit between keyword and phrase
    let segment = segment.trim_start();
    let line = segment.split('\n').next().unwrap_or("");

    let phrase = line.trim().trim_end_matches('-').trim();
    if phrase.is_empty() {
        None
    } else {
        Some(phrase.to_string())
    }
}

/// Whether a card needs its notes scanned again.
///
/// Never processed means yes. Otherwise only a strictly newer modification
/// time triggers a rescan; a missing modification time never does.
pub fn should_reprocess(
    last_modified: Option<DateTime<Utc>>,
    last_processed: Option<DateTime<Utc>>,
) -> bool {
    match (last_modified, last_processed) {
        (_, None) => true,
        (Some(modified), Some(processed)) => modified > processed,
        (None, Some(_)) => false,
    }
}

/// Parse a serialized instant, keeping sub-second precision.
///
/// Accepts RFC 3339 (`2024-03-01T10:15:30.250Z`, offsets allowed) and bare
/// dates, which are taken as midnight UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Phrases not already present as tracking entries (exact, case-sensitive).
pub fn filter_new(extracted: &[String], existing: &[String]) -> Vec<String> {
    let known: HashSet<&str> = existing.iter().map(String::as_str).collect();
    extracted
        .iter()
        .filter(|phrase| !known.contains(phrase.as_str()))
        .cloned()
        .collect()
}

/// Mark the first plain `ACTION: <phrase>` in `text` as completed.
///
/// Returns the (possibly) rewritten text and whether anything changed. Text
/// that already carries `✅ ACTION: <phrase>` (phrase compared
/// case-insensitively) is returned untouched, as is text without the phrase.
pub fn build_completion_rewrite(text: &str, phrase: &str) -> (String, bool) {
    if phrase.trim().is_empty() {
        return (text.to_string(), false);
    }

    let escaped = regex::escape(phrase);

    let completed = match Regex::new(&format!(
        r"(?i){}\s*ACTION:\s*{}",
        regex::escape(COMPLETED_MARKER),
        escaped
    )) {
        Ok(re) => re,
        Err(e) => {
            log::warn!("[MARKERS] Cannot build completion pattern for '{}': {}", phrase, e);
            return (text.to_string(), false);
        }
    };
    if completed.is_match(text) {
        log::debug!("[MARKERS] Action item already marked as completed: {}", phrase);
        return (text.to_string(), false);
    }

    let plain = match Regex::new(&format!(r"(?i:ACTION:)\s*{}", escaped)) {
        Ok(re) => re,
        Err(e) => {
            log::warn!("[MARKERS] Cannot build marker pattern for '{}': {}", phrase, e);
            return (text.to_string(), false);
        }
    };
    if !plain.is_match(text) {
        return (text.to_string(), false);
    }

    let replacement = format!("{} {} {}", COMPLETED_MARKER, ACTION_KEYWORD, phrase);
    let rewritten = plain.replacen(text, 1, NoExpand(&replacement)).into_owned();
    (rewritten, true)
}
