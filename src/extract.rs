//! Structured response extraction
//!
//! Generators wrap their payloads in prose, code fences, and half-finished
//! JSON. This module recovers typed records from that mess: scan for a
//! plausible structural delimiter, take the maximal balanced span
//! (skipping quoted strings and escapes so braces inside literals are not
//! mistaken for structure), then walk a fixed ladder of repair heuristics
//! until one parses; spans that parse to nothing usable are skipped in
//! favor of the next delimiter. Failure to extract is a normal outcome,
//! reported as `None`, never as an error.
//!
//! Everything here is a pure function of its input.

use serde_json::Value;
use tracing::debug;

use crate::domain::{ArtifactDraft, ArtifactFields, StageKind, TestCategory};

/// Delimiter positions tried per candidate text before giving up
const MAX_SPAN_STARTS: usize = 8;

/// Extract typed records for one stage from raw generator text
///
/// Returns `None` when no repair heuristic yields a parseable payload with
/// at least one record conforming to the stage's expected shape. Records
/// beyond `max_records` are dropped.
pub fn extract_records(raw: &str, stage: StageKind, max_records: usize) -> Option<Vec<ArtifactDraft>> {
    for value in parsed_candidates(raw) {
        let records = records_from_value(&value, stage, max_records);
        if !records.is_empty() {
            return Some(records);
        }
    }
    debug!(%stage, "extract_records: no conforming records in any candidate payload");
    None
}

/// Parse raw text into candidate JSON values, in preference order
///
/// Candidate texts: fenced block content first (the payload is usually
/// inside the fence when one exists), then the raw text. Within each,
/// prose can contain stray braces before the payload ("wrap it in {}"),
/// so a span that fails to parse or yields nothing conforming does not
/// end the search: the scan resumes from the next opening delimiter.
fn parsed_candidates(raw: &str) -> Vec<Value> {
    let fenced = strip_code_fence(raw);
    let candidates: Vec<&str> = match &fenced {
        Some(inner) => vec![inner.as_str(), raw],
        None => vec![raw],
    };

    let mut values = Vec::new();
    for candidate in candidates {
        // Direct parse of the whole candidate
        if let Ok(value) = serde_json::from_str::<Value>(candidate.trim()) {
            values.push(value);
            continue;
        }

        let mut search_from = 0;
        for _ in 0..MAX_SPAN_STARTS {
            let Some(rel) = candidate[search_from..].find(['[', '{']) else {
                break;
            };
            let span_start = search_from + rel;
            if let Some(value) = parse_with_repairs(&candidate[span_start..]) {
                values.push(value);
            }
            search_from = span_start + 1;
        }
    }
    values
}

/// Run the repair ladder on one tail, stopping at the first parse success
fn parse_with_repairs(tail: &str) -> Option<Value> {
    // Maximal balanced span, ignoring delimiters inside string literals
    if let Some(span) = balanced_span(tail) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Some(value);
        }
        let repaired = strip_trailing_commas(span);
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            return Some(value);
        }
    }

    // Truncated output: close whatever is still open
    let closed = close_open_delimiters(tail);
    if let Ok(value) = serde_json::from_str::<Value>(&closed) {
        return Some(value);
    }

    // Last resort: drop the dangling final element, then close
    if let Some(trimmed) = drop_dangling_tail(tail) {
        let closed = close_open_delimiters(&trimmed);
        if let Ok(value) = serde_json::from_str::<Value>(&closed) {
            return Some(value);
        }
    }

    None
}

/// Return the content of the first fenced code block, if any
///
/// Tolerates a language tag after the opening fence and a missing closing
/// fence (truncated output).
fn strip_code_fence(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the language tag line
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let inner = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    Some(inner.trim().to_string())
}

/// Extract the maximal balanced span starting at the first delimiter
///
/// Tracks nesting depth while correctly skipping quoted string contents,
/// honoring backslash escapes. Returns `None` if the span never closes.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove commas that directly precede a closing delimiter
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ']' | '}' => {
                // Drop a trailing comma (and whitespace) before the closer
                while out
                    .chars()
                    .last()
                    .map(|c| c == ',' || c.is_whitespace())
                    .unwrap_or(false)
                {
                    if out.ends_with(',') {
                        out.pop();
                        break;
                    }
                    out.pop();
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Append closers for every delimiter still open at end of input
///
/// An unterminated string literal is closed first. Trailing commas are
/// stripped afterwards so the result has a chance of parsing.
fn close_open_delimiters(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = text.trim_end().to_string();
    if in_string {
        out.push('"');
    }
    for closer in stack.into_iter().rev() {
        out.push(closer);
    }
    strip_trailing_commas(&out)
}

/// Truncate at the last element boundary of the outermost container
///
/// Used when the tail of the payload is garbage: everything after the last
/// comma at depth 1 (outside strings) is dropped, leaving only complete
/// elements for [`close_open_delimiters`] to seal.
fn drop_dangling_tail(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_boundary = None;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 1 => last_boundary = Some(idx),
            _ => {}
        }
    }

    last_boundary.map(|idx| text[..idx].to_string())
}

/// Wrapper keys generators like to put around the record array
const WRAPPER_KEYS: [&str; 8] = [
    "records",
    "items",
    "epics",
    "features",
    "stories",
    "tasks",
    "test_cases",
    "artifacts",
];

/// Map a parsed JSON value to stage records
fn records_from_value(value: &Value, stage: StageKind, max_records: usize) -> Vec<ArtifactDraft> {
    let objects: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            // A single record, or a wrapper object around the array
            if let Some(array) = WRAPPER_KEYS.iter().find_map(|k| map.get(*k)).and_then(Value::as_array) {
                array.iter().collect()
            } else {
                vec![value]
            }
        }
        _ => return Vec::new(),
    };

    objects
        .into_iter()
        .filter_map(|obj| draft_from_object(obj, stage))
        .take(max_records)
        .collect()
}

/// Build a draft from one JSON object, defaulting optional fields
///
/// The only hard requirement is a non-empty title; everything else
/// resolves to an explicit default rather than a silently absent field.
fn draft_from_object(value: &Value, stage: StageKind) -> Option<ArtifactDraft> {
    let obj = value.as_object()?;

    let title = obj
        .get("title")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();

    let description = obj
        .get("description")
        .or_else(|| obj.get("summary"))
        .or_else(|| obj.get("objective"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let fields = match stage {
        StageKind::Epic => ArtifactFields::Epic { objective: description },
        StageKind::Feature => ArtifactFields::Feature { description },
        StageKind::Story => ArtifactFields::Story {
            description,
            acceptance_criteria: string_array(obj.get("acceptance_criteria")),
        },
        StageKind::Task => ArtifactFields::Task { description },
        StageKind::TestCase => ArtifactFields::TestCase {
            description,
            category: match obj.get("category").and_then(Value::as_str) {
                Some("boundary") => TestCategory::Boundary,
                _ => TestCategory::Functional,
            },
        },
    };

    Some(ArtifactDraft::new(title, fields))
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_array() {
        let raw = r#"[{"title": "Browse catalog", "description": "List plants"}]"#;
        let records = extract_records(raw, StageKind::Feature, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Browse catalog");
    }

    #[test]
    fn test_fenced_with_trailing_prose() {
        let raw = "Here is the result:\n```json\n{\"title\":\"X\"}\n```\nLet me know if you need more.";
        let records = extract_records(raw, StageKind::Epic, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "X");
    }

    #[test]
    fn test_prose_before_and_after() {
        let raw = "Sure! Based on your vision I suggest:\n\n[{\"title\": \"Cart\"}, {\"title\": \"Checkout\"}]\n\nThese cover the core flows.";
        let records = extract_records(raw, StageKind::Feature, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title, "Checkout");
    }

    #[test]
    fn test_braces_in_prose_before_payload() {
        let raw = r#"Sure! I'll wrap it in {} as requested: [{"title": "Cart"}, {"title": "Checkout"}]"#;
        let records = extract_records(raw, StageKind::Feature, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Cart");
    }

    #[test]
    fn test_braces_inside_string_literals() {
        let raw = r#"[{"title": "Parse {config}", "description": "Handle [nested] {braces} in text"}]"#;
        let records = extract_records(raw, StageKind::Task, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Parse {config}");
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let raw = r#"[{"title": "Say \"hello\"", "description": "quoted"}]"#;
        let records = extract_records(raw, StageKind::Task, 10).unwrap();
        assert_eq!(records[0].title, r#"Say "hello""#);
    }

    #[test]
    fn test_trailing_comma() {
        let raw = r#"[{"title": "A"}, {"title": "B"},]"#;
        let records = extract_records(raw, StageKind::Story, 10).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_truncated_tail_recovers_complete_elements() {
        // Output cut off mid-record; the two complete records survive
        let raw = r#"[{"title": "A", "description": "done"}, {"title": "B"}, {"title": "C", "descri"#;
        let records = extract_records(raw, StageKind::Task, 10).unwrap();
        assert!(records.len() >= 2);
        assert_eq!(records[0].title, "A");
        assert_eq!(records[1].title, "B");
    }

    #[test]
    fn test_wrapper_object() {
        let raw = r#"{"stories": [{"title": "As a user I browse", "acceptance_criteria": ["sees list"]}]}"#;
        let records = extract_records(raw, StageKind::Story, 10).unwrap();
        assert_eq!(records.len(), 1);
        match &records[0].fields {
            ArtifactFields::Story {
                acceptance_criteria, ..
            } => assert_eq!(acceptance_criteria, &vec!["sees list".to_string()]),
            other => panic!("expected story fields, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let raw = r#"[{"title": "Bare"}]"#;
        let records = extract_records(raw, StageKind::TestCase, 10).unwrap();
        match &records[0].fields {
            ArtifactFields::TestCase { description, category } => {
                assert_eq!(description, "");
                assert_eq!(*category, TestCategory::Functional);
            }
            other => panic!("expected test case fields, got {:?}", other),
        }
    }

    #[test]
    fn test_record_cap() {
        let raw = r#"[{"title": "A"}, {"title": "B"}, {"title": "C"}]"#;
        let records = extract_records(raw, StageKind::Feature, 2).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_unusable_input() {
        assert!(extract_records("no structure here at all", StageKind::Epic, 10).is_none());
        assert!(extract_records("", StageKind::Epic, 10).is_none());
        // Parseable but no conforming records (title missing)
        assert!(extract_records(r#"[{"description": "no title"}]"#, StageKind::Epic, 10).is_none());
        // Title present but empty
        assert!(extract_records(r#"[{"title": "  "}]"#, StageKind::Epic, 10).is_none());
    }

    #[test]
    fn test_balanced_span_stops_at_close() {
        let text = r#"{"a": 1} trailing"#;
        assert_eq!(balanced_span(text), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_drop_dangling_tail() {
        let text = r#"[{"a": 1}, {"b": 2}, {"c"#;
        let trimmed = drop_dangling_tail(text).unwrap();
        assert_eq!(trimmed, r#"[{"a": 1}, {"b": 2}"#);
    }

    fn prose() -> impl Strategy<Value = String> {
        // Free text without structural delimiters or quotes, the way a
        // chatty generator pads its answers
        "[a-zA-Z ,.!\n]{0,80}"
    }

    fn titles() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-zA-Z][a-zA-Z0-9 ]{0,20}", 1..5)
    }

    proptest! {
        #[test]
        fn prop_roundtrip_through_prose_and_fences(titles in titles(), before in prose(), after in prose(), fenced in any::<bool>()) {
            let payload = serde_json::to_string(
                &titles.iter().map(|t| serde_json::json!({"title": t})).collect::<Vec<_>>(),
            ).unwrap();

            let raw = if fenced {
                format!("{}\n```json\n{}\n```\n{}", before, payload, after)
            } else {
                format!("{}\n{}\n{}", before, payload, after)
            };

            let records = extract_records(&raw, StageKind::Feature, 100).unwrap();
            let expected: Vec<String> = titles.iter().map(|t| t.trim().to_string()).collect();
            let got: Vec<String> = records.iter().map(|r| r.title.clone()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
