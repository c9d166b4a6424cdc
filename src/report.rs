//! Plain-text reports for the output channel

use crate::review::{CanonicalReview, Finding};
use crate::util::truncate;
use crate::workspace::{BatchSummary, Outcome};
use std::fmt::Write;
use std::path::Path;

const RULE: &str = "────────────────────────────────────────";

/// Widest summary shown per file in a batch listing
const LISTING_SUMMARY_CHARS: usize = 72;

fn push_findings(out: &mut String, title: &str, findings: &[Finding]) {
    if findings.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{} ({})", title, findings.len());
    for finding in findings {
        match finding.line {
            Some(line) => {
                let _ = writeln!(out, "  - line {}: {}", line, finding.text);
            }
            None => {
                let _ = writeln!(out, "  - {}", finding.text);
            }
        }
    }
}

/// Full report for one file
pub fn file_report(path: &Path, review: &CanonicalReview, cached: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "{}  score {}/10{}",
        path.display(),
        review.score,
        if cached { "  (cached)" } else { "" }
    );
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}", review.summary);

    if !review.issues.is_empty() {
        let _ = writeln!(out, "\nIssues ({})", review.issues.len());
        for issue in &review.issues {
            let severity = issue
                .severity
                .map(|s| format!("[{}] ", s.label()))
                .unwrap_or_default();
            match issue.line {
                Some(line) => {
                    let _ = writeln!(out, "  - {}line {}: {}", severity, line, issue.text);
                }
                None => {
                    let _ = writeln!(out, "  - {}{}", severity, issue.text);
                }
            }
        }
    }
    push_findings(&mut out, "Security", &review.security_findings);
    push_findings(&mut out, "Suggestions", &review.suggestions);

    if review.is_clean() && review.suggestions.is_empty() {
        let _ = writeln!(out, "\nNo findings.");
    }
    out
}

/// One line per file plus totals
pub fn batch_report(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "Workspace review{}",
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    let _ = writeln!(out, "{}", RULE);

    for entry in &summary.outcomes {
        let path = entry.path.display();
        match &entry.outcome {
            Outcome::Reviewed { review, cached } => {
                let _ = writeln!(
                    out,
                    "  {:>2}/10  {}{}  {}",
                    review.score,
                    path,
                    if *cached { " (cached)" } else { "" },
                    truncate(&review.summary.replace('\n', " "), LISTING_SUMMARY_CHARS)
                );
            }
            Outcome::Skipped { reason } => {
                let _ = writeln!(out, "  skip    {}  {}", path, reason);
            }
            Outcome::Failed { message } => {
                let _ = writeln!(out, "  FAIL    {}  {}", path, message);
            }
        }
    }

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "{} of {} file(s) reviewed, {} skipped, {} failed, {} from cache",
        summary.scanned, summary.total, summary.skipped, summary.failed, summary.cached
    );
    let _ = writeln!(
        out,
        "{} issue(s), {} suggestion(s) in {:.1}s",
        summary.issue_count,
        summary.suggestion_count,
        summary.elapsed_ms as f64 / 1000.0
    );
    out
}
