//! Downstream consumers of a finished review
//!
//! The pipeline hands every [`CanonicalReview`] to four sinks: diagnostics
//! (inline markers), a keyed review store, decorations (per-file badges) and
//! a plain-text output channel. Each sink owns its own rendering.

use crate::review::{CanonicalReview, Severity};
use crate::util::lock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait DiagnosticsSink {
    /// Replace the diagnostics for `path` with those derived from `review`
    fn publish(&self, path: &Path, review: &CanonicalReview);
}

pub trait ReviewStore {
    fn put(&self, path: &Path, review: &CanonicalReview);
    fn get(&self, path: &Path) -> Option<CanonicalReview>;
}

pub trait DecorationSink {
    /// The review for `path` changed; recompute its badge
    fn refresh(&self, path: &Path);
}

pub trait OutputSink {
    fn line(&self, text: &str);
}

/// The set of sinks a review is published to
#[derive(Clone, Copy)]
pub struct Sinks<'a> {
    pub diagnostics: &'a dyn DiagnosticsSink,
    pub store: &'a dyn ReviewStore,
    pub decorations: &'a dyn DecorationSink,
    pub output: &'a dyn OutputSink,
}

impl Sinks<'_> {
    /// Store first so decorations read the fresh review
    pub fn publish(&self, path: &Path, review: &CanonicalReview) {
        self.store.put(path, review);
        self.diagnostics.publish(path, review);
        self.decorations.refresh(path);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSource {
    Issue,
    Security,
    Suggestion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based; findings without a line anchor sit on line 1
    pub line: u32,
    pub severity: Severity,
    pub source: DiagnosticSource,
    pub message: String,
}

impl Diagnostic {
    pub fn render(&self, path: &Path) -> String {
        let prefix = match self.source {
            DiagnosticSource::Security => "[security] ",
            _ => "",
        };
        format!(
            "{}:{}: {}: {}{}",
            path.display(),
            self.line,
            self.severity.label(),
            prefix,
            self.message
        )
    }
}

/// Turn a review into inline markers, issues first, then security, then suggestions
pub fn diagnostics_for(review: &CanonicalReview) -> Vec<Diagnostic> {
    let issues = review.issues.iter().map(|issue| Diagnostic {
        line: issue.line.unwrap_or(1),
        severity: issue.severity.unwrap_or(Severity::Warning),
        source: DiagnosticSource::Issue,
        message: issue.text.clone(),
    });
    let security = review.security_findings.iter().map(|finding| Diagnostic {
        line: finding.line.unwrap_or(1),
        severity: Severity::Error,
        source: DiagnosticSource::Security,
        message: finding.text.clone(),
    });
    let suggestions = review.suggestions.iter().map(|finding| Diagnostic {
        line: finding.line.unwrap_or(1),
        severity: Severity::Info,
        source: DiagnosticSource::Suggestion,
        message: finding.text.clone(),
    });
    issues.chain(security).chain(suggestions).collect()
}

/// In-memory diagnostics, one list per file
#[derive(Debug, Default)]
pub struct DiagnosticCollection {
    by_file: Mutex<BTreeMap<PathBuf, Vec<Diagnostic>>>,
}

impl DiagnosticCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_file(&self, path: &Path) -> Vec<Diagnostic> {
        lock(&self.by_file).get(path).cloned().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        lock(&self.by_file).values().map(Vec::len).sum()
    }

    /// Compiler-style listing, files in path order, markers in line order
    pub fn render(&self) -> Vec<String> {
        let by_file = lock(&self.by_file);
        let mut lines = Vec::new();
        for (path, diagnostics) in by_file.iter() {
            let mut sorted: Vec<&Diagnostic> = diagnostics.iter().collect();
            sorted.sort_by_key(|d| (d.line, std::cmp::Reverse(d.severity)));
            lines.extend(sorted.into_iter().map(|d| d.render(path)));
        }
        lines
    }
}

impl DiagnosticsSink for DiagnosticCollection {
    fn publish(&self, path: &Path, review: &CanonicalReview) {
        lock(&self.by_file).insert(path.to_path_buf(), diagnostics_for(review));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STORE + DECORATIONS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    reviews: Mutex<HashMap<PathBuf, CanonicalReview>>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.reviews).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReviewStore for MemoryReviewStore {
    fn put(&self, path: &Path, review: &CanonicalReview) {
        lock(&self.reviews).insert(path.to_path_buf(), review.clone());
    }

    fn get(&self, path: &Path) -> Option<CanonicalReview> {
        lock(&self.reviews).get(path).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Good,
    Fair,
    Poor,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            8.. => Grade::Good,
            5..=7 => Grade::Fair,
            _ => Grade::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::Good => "good",
            Grade::Fair => "fair",
            Grade::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub grade: Grade,
    pub score: u8,
    pub issues: usize,
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}/10", self.grade.label(), self.score)?;
        match self.issues {
            0 => write!(f, "]"),
            1 => write!(f, ", 1 issue]"),
            n => write!(f, ", {} issues]", n),
        }
    }
}

/// Per-file badges computed from whatever the store holds
pub struct ScoreBadges<'s> {
    store: &'s dyn ReviewStore,
    badges: Mutex<HashMap<PathBuf, Badge>>,
}

impl<'s> ScoreBadges<'s> {
    pub fn new(store: &'s dyn ReviewStore) -> Self {
        Self {
            store,
            badges: Mutex::new(HashMap::new()),
        }
    }

    pub fn badge(&self, path: &Path) -> Option<Badge> {
        lock(&self.badges).get(path).copied()
    }
}

impl DecorationSink for ScoreBadges<'_> {
    fn refresh(&self, path: &Path) {
        let badge = self.store.get(path).map(|review| Badge {
            grade: Grade::from_score(review.score),
            score: review.score,
            issues: review.issue_count(),
        });
        let mut badges = lock(&self.badges);
        match badge {
            Some(badge) => {
                badges.insert(path.to_path_buf(), badge);
            }
            None => {
                badges.remove(path);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OUTPUT
// ═══════════════════════════════════════════════════════════════════════════

/// Status lines on stderr, keeping stdout free for `--json`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl OutputSink for ConsoleOutput {
    fn line(&self, text: &str) {
        eprintln!("{}", text);
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct BufferedOutput {
    lines: Mutex<Vec<String>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl OutputSink for BufferedOutput {
    fn line(&self, text: &str) {
        lock(&self.lines).push(text.to_string());
    }
}
