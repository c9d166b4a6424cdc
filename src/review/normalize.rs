//! Response normalizer
//!
//! Turns whatever the backend sent into a [`CanonicalReview`]. The payload
//! is untrusted: it may be a JSON object, a JSON-encoded string, markdown, or
//! noise. Every field is coerced on its own and anything unusable falls back
//! to a default, so [`normalize`] is total.

use super::parse::{line_reference, parse_text, salvage_json_object, ParsedText};
use super::{CanonicalReview, Finding, Issue, Severity, DEFAULT_SCORE, MAX_SCORE, PLACEHOLDER_SUMMARY};
use serde_json::{Map, Value};

/// How many times a payload may be unwrapped (wrapper objects, JSON inside
/// strings) before we stop looking deeper.
const MAX_UNWRAP_DEPTH: usize = 4;

const SUGGESTION_KEYS: &[&str] = &["suggestions", "improvements", "recommendations"];
const ISSUE_KEYS: &[&str] = &["bugs", "issues"];
const SECURITY_KEYS: &[&str] = &[
    "security",
    "securityFindings",
    "security_findings",
    "securityIssues",
    "vulnerabilities",
];
const ITEM_TEXT_KEYS: &[&str] = &[
    "text",
    "message",
    "description",
    "issue",
    "suggestion",
    "title",
    "finding",
    "detail",
];
const ITEM_LINE_KEYS: &[&str] = &["line", "lineNumber", "line_number", "startLine"];
const ITEM_SEVERITY_KEYS: &[&str] = &["severity", "level", "priority"];
const WRAPPER_KEYS: &[&str] = &["result", "data", "analysis", "review"];

/// Payload returned by the review backend
#[derive(Debug, Clone, PartialEq)]
pub enum RawAnalysis {
    Json(Value),
    Text(String),
}

impl RawAnalysis {
    /// Interpret an HTTP response body: JSON when it parses, text otherwise
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => RawAnalysis::Json(value),
            Err(_) => RawAnalysis::Text(body.to_string()),
        }
    }

    /// The payload as text, kept on the review for debugging
    pub fn raw_text(&self) -> String {
        match self {
            RawAnalysis::Text(text) => text.clone(),
            RawAnalysis::Json(Value::String(text)) => text.clone(),
            RawAnalysis::Json(Value::Object(map)) => match canonical_raw(map) {
                Some(raw) => raw.to_string(),
                None => Value::Object(map.clone()).to_string(),
            },
            RawAnalysis::Json(other) => other.to_string(),
        }
    }
}

/// Fields a serialized [`CanonicalReview`] always carries
const CANONICAL_KEYS: &[&str] = &[
    "score",
    "summary",
    "suggestions",
    "issues",
    "securityFindings",
];

/// The `raw` of a record that already went through normalization.
/// Any other object keeps its full serialization, even with a `raw` key.
fn canonical_raw(map: &Map<String, Value>) -> Option<&str> {
    if !CANONICAL_KEYS.iter().all(|key| map.contains_key(*key)) {
        return None;
    }
    map.get("raw").and_then(Value::as_str)
}

impl From<Value> for RawAnalysis {
    fn from(value: Value) -> Self {
        RawAnalysis::Json(value)
    }
}

impl From<String> for RawAnalysis {
    fn from(text: String) -> Self {
        RawAnalysis::Text(text)
    }
}

impl From<&str> for RawAnalysis {
    fn from(text: &str) -> Self {
        RawAnalysis::Text(text.to_string())
    }
}

/// Normalize any backend payload into a fully populated review.
pub fn normalize(payload: &RawAnalysis) -> CanonicalReview {
    let raw = payload.raw_text();

    let partial = match payload {
        RawAnalysis::Text(text) | RawAnalysis::Json(Value::String(text)) => {
            partial_from_text(text, 0, true)
        }
        RawAnalysis::Json(Value::Object(map)) => partial_from_map(map, 0),
        RawAnalysis::Json(_) => return CanonicalReview::minimal(raw),
    };

    partial.finish(raw)
}

/// Fields recovered so far; `None`/empty means "still missing"
#[derive(Debug, Default)]
struct Partial {
    score: Option<u8>,
    summary: Option<String>,
    suggestions: Vec<Finding>,
    issues: Vec<Issue>,
    security: Vec<Finding>,
}

impl Partial {
    /// Fill gaps from a lower-priority source. Explicit values always win.
    fn backfill(&mut self, other: Partial) {
        if self.score.is_none() {
            self.score = other.score;
        }
        if self.summary.is_none() {
            self.summary = other.summary;
        }
        if self.suggestions.is_empty() {
            self.suggestions = other.suggestions;
        }
        if self.issues.is_empty() {
            self.issues = other.issues;
        }
        if self.security.is_empty() {
            self.security = other.security;
        }
    }

    fn finish(self, raw: String) -> CanonicalReview {
        CanonicalReview {
            score: self.score.unwrap_or(DEFAULT_SCORE),
            summary: self
                .summary
                .unwrap_or_else(|| PLACEHOLDER_SUMMARY.to_string()),
            suggestions: self.suggestions,
            issues: self.issues,
            security_findings: self.security,
            raw,
        }
    }
}

impl From<ParsedText> for Partial {
    fn from(parsed: ParsedText) -> Self {
        let summary = parsed.summary.trim();
        Partial {
            score: parsed.score.map(|s| s.min(MAX_SCORE)),
            summary: (!summary.is_empty()).then(|| summary.to_string()),
            suggestions: parsed.suggestions,
            issues: parsed.issues,
            security: parsed.security,
        }
    }
}

/// `literal_summary`: a bare text payload is its own summary; legacy review
/// text only contributes the summary the parser finds in it.
fn partial_from_text(text: &str, depth: usize, literal_summary: bool) -> Partial {
    if depth < MAX_UNWRAP_DEPTH {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Object(map)) => return partial_from_map(&map, depth + 1),
            Ok(Value::String(inner)) => {
                return partial_from_text(&inner, depth + 1, literal_summary)
            }
            _ => {}
        }

        if let Some(map) = salvage_json_object(text).filter(has_review_keys) {
            return partial_from_map(&map, depth + 1);
        }
    }

    let mut partial = Partial {
        summary: if literal_summary { non_empty(text) } else { None },
        ..Partial::default()
    };
    partial.backfill(parse_text(text).into());
    if partial.summary.is_none() {
        partial.summary = non_empty(text);
    }
    partial
}

fn partial_from_map(map: &Map<String, Value>, depth: usize) -> Partial {
    let map = unwrap_wrappers(map);

    let legacy = match map.get("review") {
        Some(Value::String(text)) => non_empty(text),
        _ => None,
    };

    let mut partial = Partial {
        score: coerce_score(map.get("score")),
        summary: map.get("summary").and_then(coerce_text),
        suggestions: coerce_list(map, SUGGESTION_KEYS, coerce_finding),
        issues: coerce_list(map, ISSUE_KEYS, coerce_issue),
        security: coerce_list(map, SECURITY_KEYS, coerce_finding),
    };

    if let Some(text) = legacy {
        let from_legacy = if depth < MAX_UNWRAP_DEPTH {
            partial_from_text(&text, depth + 1, false)
        } else {
            Partial {
                summary: Some(text),
                ..Partial::default()
            }
        };
        partial.backfill(from_legacy);
    }

    partial
}

/// Whether an object looks like a review rather than an envelope
fn has_review_keys(map: &Map<String, Value>) -> bool {
    let known = ["score", "summary"]
        .iter()
        .chain(SUGGESTION_KEYS)
        .chain(ISSUE_KEYS)
        .chain(SECURITY_KEYS)
        .any(|key| map.contains_key(*key));
    known || matches!(map.get("review"), Some(Value::String(_)))
}

/// Descend through `{"result": {...}}` style envelopes
fn unwrap_wrappers(map: &Map<String, Value>) -> &Map<String, Value> {
    let mut current = map;
    for _ in 0..MAX_UNWRAP_DEPTH {
        if has_review_keys(current) {
            break;
        }
        let inner = WRAPPER_KEYS.iter().find_map(|key| match current.get(*key) {
            Some(Value::Object(inner)) => Some(inner),
            _ => None,
        });
        match inner {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// 0 is a real score; only absent or unparseable values are `None`.
fn coerce_score(value: Option<&Value>) -> Option<u8> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            // Accept "7" and "7/10"
            let head = s.split('/').next().unwrap_or("").trim();
            head.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, MAX_SCORE as f64) as u8)
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_line(value: &Value) -> Option<u32> {
    let line = match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => v,
            None => {
                let f = n.as_f64()?;
                if !f.is_finite() || f.fract() != 0.0 || f < 1.0 {
                    return None;
                }
                f as u64
            }
        },
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => return line_reference(s),
        },
        _ => return None,
    };
    u32::try_from(line).ok().filter(|l| *l > 0)
}

/// First alias that holds a non-empty array. Non-arrays count as empty.
fn coerce_list<T>(
    map: &Map<String, Value>,
    keys: &[&str],
    item: fn(&Value) -> Option<T>,
) -> Vec<T> {
    keys.iter()
        .filter_map(|key| match map.get(*key) {
            Some(Value::Array(values)) => Some(values.iter().filter_map(item).collect::<Vec<T>>()),
            _ => None,
        })
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}

/// Text and optional line of a list item (plain string or object)
fn item_text_and_line(value: &Value) -> Option<(String, Option<u32>)> {
    match value {
        Value::Object(obj) => {
            let text = ITEM_TEXT_KEYS
                .iter()
                .find_map(|key| obj.get(*key).and_then(coerce_text))
                .or_else(|| (!obj.is_empty()).then(|| value.to_string()))?;
            let line = ITEM_LINE_KEYS
                .iter()
                .find_map(|key| obj.get(*key).and_then(coerce_line))
                .or_else(|| line_reference(&text));
            Some((text, line))
        }
        other => {
            let text = coerce_text(other)?;
            let line = line_reference(&text);
            Some((text, line))
        }
    }
}

fn coerce_finding(value: &Value) -> Option<Finding> {
    let (text, line) = item_text_and_line(value)?;
    Some(Finding { text, line })
}

fn coerce_issue(value: &Value) -> Option<Issue> {
    let (text, line) = item_text_and_line(value)?;
    let severity = value.as_object().and_then(|obj| {
        ITEM_SEVERITY_KEYS.iter().find_map(|key| match obj.get(*key) {
            Some(Value::String(label)) => Severity::from_label(label),
            _ => None,
        })
    });
    Some(Issue {
        text,
        line,
        severity,
    })
}
