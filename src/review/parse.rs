//! Heuristic extraction from free-form review text
//!
//! Models do not always answer in JSON. When they answer in prose or
//! markdown, this module pulls out a rating, a summary and the bullet lists
//! under suggestion/bug/security headings. Nothing here can fail: the worst
//! case is an empty result that still carries the input verbatim in `raw`.

use super::{Finding, Issue, Severity};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static RATING_OUT_OF_TEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}(?:\.\d+)?)\s*(?:/|out\s+of)\s*10\b").expect("valid rating regex")
});

static RATING_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:score|rating)\s*(?:[:=]|is|of)?\s*(\d{1,2}(?:\.\d+)?)\b")
        .expect("valid labelled rating regex")
});

static SUMMARY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#+\s*)?(?:\*\*|__)?\s*(?:summary|overview)\s*:?\s*(?:\*\*|__)?\s*:?\s*(.*)$")
        .expect("valid summary regex")
});

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d{1,3}[.)])\s+(.+)$").expect("valid bullet regex")
});

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d{1,3}[.)]\s+(.+)$").expect("valid numbered item regex")
});

static LINE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blines?\s*[:#]?\s*(\d{1,7})\b").expect("valid line reference regex")
});

static SEVERITY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[\[(]?\s*(critical|high|medium|low|error|warning|info)\s*[\])]?\s*[:\-–]?\s")
        .expect("valid severity regex")
});

/// Everything the parser could recover from a block of text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedText {
    pub score: Option<u8>,
    pub summary: String,
    pub suggestions: Vec<Finding>,
    pub issues: Vec<Issue>,
    pub security: Vec<Finding>,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Suggestions,
    Bugs,
    Security,
    Other,
}

/// Parse free-form review text. Total over all inputs.
pub fn parse_text(text: &str) -> ParsedText {
    let mut parsed = ParsedText {
        score: extract_score(text),
        summary: extract_summary(text),
        raw: text.to_string(),
        ..ParsedText::default()
    };

    let mut section: Option<Section> = None;
    // Whether the last list item can take continuation lines
    let mut open_item = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            open_item = false;
            continue;
        }

        if let Some(heading) = heading_section(line) {
            section = Some(heading);
            open_item = false;
            continue;
        }

        let Some(current) = section else {
            continue;
        };

        if let Some(item) = BULLET.captures(line).and_then(|c| c.get(1)) {
            let item = item.as_str().trim();
            if item.is_empty() {
                continue;
            }
            open_item = push_item(&mut parsed, current, item);
            continue;
        }

        // Indented text right under a bullet belongs to that bullet
        if open_item && line.starts_with([' ', '\t']) {
            append_continuation(&mut parsed, current, line.trim());
        } else {
            open_item = false;
        }
    }

    parsed
}

fn push_item(parsed: &mut ParsedText, section: Section, text: &str) -> bool {
    let line = line_reference(text);
    match section {
        Section::Suggestions => {
            parsed.suggestions.push(Finding {
                text: text.to_string(),
                line,
            });
        }
        Section::Security => {
            parsed.security.push(Finding {
                text: text.to_string(),
                line,
            });
        }
        Section::Bugs => {
            let severity = SEVERITY_TAG
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| Severity::from_label(m.as_str()));
            parsed.issues.push(Issue {
                text: text.to_string(),
                line,
                severity,
            });
        }
        Section::Summary | Section::Other => return false,
    }
    true
}

fn append_continuation(parsed: &mut ParsedText, section: Section, text: &str) {
    let target = match section {
        Section::Suggestions => parsed.suggestions.last_mut().map(|f| &mut f.text),
        Section::Security => parsed.security.last_mut().map(|f| &mut f.text),
        Section::Bugs => parsed.issues.last_mut().map(|i| &mut i.text),
        Section::Summary | Section::Other => None,
    };
    if let Some(existing) = target {
        existing.push(' ');
        existing.push_str(text);
    }
}

/// First "N/10" or "score: N" in the text, whichever comes first
fn extract_score(text: &str) -> Option<u8> {
    let first_valid = |re: &Regex| {
        re.captures_iter(text).find_map(|caps| {
            let m = caps.get(1)?;
            let value: f64 = m.as_str().parse().ok()?;
            if (0.0..=10.0).contains(&value) {
                Some((m.start(), value.round() as u8))
            } else {
                None
            }
        })
    };

    match (first_valid(&RATING_OUT_OF_TEN), first_valid(&RATING_LABELLED)) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (Some(a), None) | (None, Some(a)) => Some(a.1),
        (None, None) => None,
    }
}

/// Labelled summary section if present, otherwise the first paragraph
fn extract_summary(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = SUMMARY_LABEL.captures(line) else {
            continue;
        };
        let inline = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let mut parts: Vec<&str> = Vec::new();
        if !inline.is_empty() {
            parts.push(inline);
        }
        parts.extend(paragraph_after(&lines[idx + 1..], !inline.is_empty()));
        let summary = parts.join(" ");
        if !summary.is_empty() {
            return summary;
        }
    }

    first_paragraph(&lines)
}

/// Lines of the paragraph starting at `lines[0]`. When `continuing`, the
/// paragraph already started on the label line, so a blank line ends it
/// immediately; otherwise leading blank lines are skipped.
fn paragraph_after<'a>(lines: &[&'a str], continuing: bool) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut started = continuing;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if started {
                break;
            }
            continue;
        }
        if heading_section(line).is_some() || BULLET.is_match(line) {
            break;
        }
        started = true;
        out.push(trimmed);
    }
    out
}

fn first_paragraph(lines: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if out.is_empty() {
                continue;
            }
            break;
        }
        if heading_section(line).is_some() || is_rating_line(trimmed) {
            if out.is_empty() {
                continue;
            }
            break;
        }
        out.push(trimmed);
    }
    out.join(" ")
}

fn is_rating_line(trimmed: &str) -> bool {
    let lower = trimmed.trim_start_matches(['*', '#', ' ']).to_lowercase();
    (lower.starts_with("score") || lower.starts_with("rating") || lower.starts_with("overall"))
        && extract_score(trimmed).is_some()
        && trimmed.len() < 40
}

/// Classify a heading line. Non-heading lines return `None`.
fn heading_section(line: &str) -> Option<Section> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let text = if let Some(rest) = trimmed.strip_prefix('#') {
        rest.trim_start_matches('#').trim()
    } else if let Some(inner) = strip_emphasis(trimmed) {
        inner
    } else if let Some(item) = NUMBERED.captures(trimmed).and_then(|c| c.get(1)) {
        // "1. Security Issues:" style numbered headings
        let item = item.as_str().trim();
        let bare = strip_emphasis(item).unwrap_or(item);
        if !bare.ends_with(':') || bare.len() > 60 {
            return None;
        }
        return match classify_heading(bare) {
            Section::Other | Section::Summary => None,
            known => Some(known),
        };
    } else if BULLET.is_match(trimmed) {
        return None;
    } else if trimmed.ends_with(':') && trimmed.len() <= 60 {
        // Bare "Bugs:" only; lead-ins like "Here is what I found:" are prose
        return match classify_heading(trimmed) {
            Section::Other => None,
            known => Some(known),
        };
    } else {
        return None;
    };

    Some(classify_heading(text))
}

/// `**Bugs**`, `__Bugs__:` and `**Bugs:**` style headings
fn strip_emphasis(text: &str) -> Option<&str> {
    let stripped = text.trim_end_matches(':');
    for marker in ["**", "__"] {
        if let Some(inner) = stripped
            .strip_prefix(marker)
            .and_then(|s| s.strip_suffix(marker))
        {
            if !inner.is_empty() && !inner.contains(marker) {
                return Some(inner.trim());
            }
        }
    }
    None
}

fn classify_heading(text: &str) -> Section {
    let lower = text.trim_end_matches(':').to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["secur", "vulnerab", "cve", "injection", "exploit"]) {
        Section::Security
    } else if has(&["bug", "issue", "error", "problem", "defect", "flaw"]) {
        Section::Bugs
    } else if has(&["suggest", "improv", "recommend", "refactor", "best practice", "enhancement"]) {
        Section::Suggestions
    } else if has(&["summary", "overview"]) {
        Section::Summary
    } else {
        Section::Other
    }
}

/// Explicit "line N" reference inside an item, if positive
pub(crate) fn line_reference(text: &str) -> Option<u32> {
    LINE_REF
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|line| *line > 0)
}

// ═══════════════════════════════════════════════════════════════════════════
//  JSON SALVAGE
// ═══════════════════════════════════════════════════════════════════════════

/// Strip markdown code fences from a response
pub(crate) fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        trimmed
    };
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// Extract a JSON fragment between matching delimiters
pub(crate) fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Try to fix common JSON issues from LLM responses
pub(crate) fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Remove trailing commas before ] or }
    fixed = fixed.replace(",]", "]");
    fixed = fixed.replace(",}", "}");
    fixed = fixed.replace(",\n]", "\n]");
    fixed = fixed.replace(",\n}", "\n}");

    // Smart quotes to regular quotes
    fixed = fixed.replace(['\u{201C}', '\u{201D}'], "\"");
    fixed = fixed.replace(['\u{2018}', '\u{2019}'], "'");

    fixed
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

/// Pull a JSON object out of prose, fenced blocks, or slightly broken JSON
pub(crate) fn salvage_json_object(text: &str) -> Option<Map<String, Value>> {
    let clean = strip_markdown_fences(text);
    let fragment = extract_json_fragment(clean, '{', '}')?;

    let parsed = serde_json::from_str::<Value>(fragment)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&fix_json_issues(fragment)).ok())?;

    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKDOWN_REVIEW: &str = "\
Overall this module is tidy but has a couple of sharp edges.
Error paths need attention.

Score: 6/10

## Bugs
- [High] Possible null dereference on line 42 when config is missing
- Off-by-one in the loop bound (line 7)
  only triggers for empty input

## Security Concerns
1. SQL built with string concatenation at line 88
2. Secrets logged in debug output

## Suggestions
* Extract the retry loop into a helper
* Rename `tmp` to something meaningful, line 12
";

    #[test]
    fn test_parses_markdown_sections() {
        let parsed = parse_text(MARKDOWN_REVIEW);

        assert_eq!(parsed.score, Some(6));
        assert_eq!(
            parsed.summary,
            "Overall this module is tidy but has a couple of sharp edges. Error paths need attention."
        );

        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[0].line, Some(42));
        assert_eq!(parsed.issues[0].severity, Some(Severity::Error));
        assert_eq!(parsed.issues[1].line, Some(7));
        assert!(parsed.issues[1].text.ends_with("only triggers for empty input"));

        assert_eq!(parsed.security.len(), 2);
        assert_eq!(parsed.security[0].line, Some(88));
        assert_eq!(parsed.security[1].line, None);

        assert_eq!(parsed.suggestions.len(), 2);
        assert_eq!(parsed.suggestions[1].line, Some(12));
        assert_eq!(parsed.raw, MARKDOWN_REVIEW);
    }

    #[test]
    fn test_labelled_summary_wins_over_first_paragraph() {
        let text = "Reviewed by the bot.\n\n**Summary:** Solid error handling overall.\n\n### Suggestions\n- Add docs";
        let parsed = parse_text(text);
        assert_eq!(parsed.summary, "Solid error handling overall.");
        assert_eq!(parsed.suggestions, vec![Finding::new("Add docs")]);
    }

    #[test]
    fn test_summary_heading_takes_following_paragraph() {
        let text = "# Summary\nThe parser is robust.\nIt handles edge cases.\n\n# Issues\n- none really";
        let parsed = parse_text(text);
        assert_eq!(parsed.summary, "The parser is robust. It handles edge cases.");
        assert_eq!(parsed.issues.len(), 1);
    }

    #[test]
    fn test_items_before_any_heading_are_ignored() {
        let text = "- stray bullet on line 3\n\nSuggestions:\n- keep this";
        let parsed = parse_text(text);
        assert_eq!(parsed.suggestions.len(), 1);
        assert_eq!(parsed.suggestions[0].text, "keep this");
        assert!(parsed.issues.is_empty());
        assert!(parsed.raw.contains("stray bullet"));
    }

    #[test]
    fn test_unrecognised_heading_stops_classification() {
        let text = "## Bugs\n- real bug\n## Praise\n- nice naming";
        let parsed = parse_text(text);
        assert_eq!(parsed.issues.len(), 1);
        assert!(parsed.suggestions.is_empty());
    }

    #[test]
    fn test_lead_in_line_keeps_current_section() {
        let text = "## Bugs\nHere is what I noticed:\n- null deref on line 4\n- leak\n";
        let parsed = parse_text(text);
        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[0].line, Some(4));
        assert_eq!(parsed.issues[1].text, "leak");
    }

    #[test]
    fn test_bare_colon_heading_still_switches_section() {
        let text = "## Suggestions\n- add docs\nProblems found:\n- crash on empty input\n";
        let parsed = parse_text(text);
        assert_eq!(parsed.suggestions, vec![Finding::new("add docs")]);
        assert_eq!(parsed.issues.len(), 1);
    }

    #[test]
    fn test_dash_item_ending_in_colon_is_not_a_heading() {
        let text = "## Suggestions\n- Improve error handling:\n- add tests\n- rename tmp\n";
        let parsed = parse_text(text);
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.suggestions.len(), 3);
        assert_eq!(parsed.suggestions[0].text, "Improve error handling:");
        assert_eq!(parsed.suggestions[2].text, "rename tmp");
    }

    #[test]
    fn test_numbered_heading_switches_section() {
        let text = "1. Security Issues:\n- token in logs\n2. Suggestions:\n- add tests\n";
        let parsed = parse_text(text);
        assert_eq!(parsed.security, vec![Finding::new("token in logs")]);
        assert_eq!(parsed.suggestions, vec![Finding::new("add tests")]);
    }

    #[test]
    fn test_first_rating_wins() {
        assert_eq!(extract_score("Rating: 3 ... later 9/10"), Some(3));
        assert_eq!(extract_score("I'd give it 8 out of 10. Score: 2"), Some(8));
        assert_eq!(extract_score("Quality 7.6/10"), Some(8));
        assert_eq!(extract_score("0/10, would not ship"), Some(0));
        assert_eq!(extract_score("15/10 amazing, score: 9"), Some(9));
        assert_eq!(extract_score("no rating here"), None);
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty = parse_text("");
        assert_eq!(empty.score, None);
        assert_eq!(empty.summary, "");
        assert!(empty.suggestions.is_empty());
        assert_eq!(empty.raw, "");

        let garbage = "\u{0}\u{1}\u{fffd}\u{fffd}### \n*\n1.\n- \n**\n::::";
        let parsed = parse_text(garbage);
        assert_eq!(parsed.raw, garbage);
    }

    #[test]
    fn test_large_input_terminates() {
        let mut text = String::from("## Bugs\n");
        for i in 0..50_000 {
            text.push_str(&format!("- problem number {} on line {}\n", i, i + 1));
        }
        let parsed = parse_text(&text);
        assert_eq!(parsed.issues.len(), 50_000);
        assert_eq!(parsed.issues[49_999].line, Some(50_000));
    }

    #[test]
    fn test_line_reference_rejects_zero() {
        assert_eq!(line_reference("see line 0"), None);
        assert_eq!(line_reference("Lines 10-12 repeat"), Some(10));
        assert_eq!(line_reference("pipeline stage"), None);
    }

    #[test]
    fn test_salvage_json_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"score\": 4, \"summary\": \"meh\",}\n```";
        let map = salvage_json_object(text).unwrap();
        assert_eq!(map["score"], 4);

        let smart = "{\u{201C}summary\u{201D}: \u{201C}ok\u{201D}}";
        assert_eq!(salvage_json_object(smart).unwrap()["summary"], "ok");

        assert!(salvage_json_object("not json at all").is_none());
        assert!(salvage_json_object("[1, 2]").is_none());
    }

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(strip_markdown_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_markdown_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_markdown_fences("  bare  "), "bare");
    }
}
