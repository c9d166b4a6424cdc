//! Canonical review record
//!
//! Every backend response, however it is shaped, ends up as a
//! [`CanonicalReview`] before anything downstream sees it.

pub mod normalize;
pub mod parse;

use serde::{Deserialize, Serialize};

pub use normalize::{normalize, RawAnalysis};
pub use parse::{parse_text, ParsedText};

/// Score used when the backend gives none (or an unusable one)
pub const DEFAULT_SCORE: u8 = 5;

/// Highest possible score
pub const MAX_SCORE: u8 = 10;

/// Summary used when nothing better is available
pub const PLACEHOLDER_SUMMARY: &str = "No summary provided.";

/// Severity attached to an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Lenient mapping from free-form labels used by different models
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "error" | "critical" | "high" | "blocker" | "major" => Some(Severity::Error),
            "warning" | "warn" | "medium" | "moderate" => Some(Severity::Warning),
            "info" | "information" | "low" | "hint" | "minor" | "note" => Some(Severity::Info),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A suggestion or security finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Finding {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            line: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// A bug reported by the reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Issue {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            line: None,
            severity: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Fully populated review of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalReview {
    /// 0-10 inclusive
    pub score: u8,
    /// Never empty
    pub summary: String,
    pub suggestions: Vec<Finding>,
    pub issues: Vec<Issue>,
    pub security_findings: Vec<Finding>,
    /// Original payload as text
    pub raw: String,
}

impl CanonicalReview {
    /// Smallest valid review: default score, placeholder summary, no findings
    pub fn minimal(raw: impl Into<String>) -> Self {
        Self {
            score: DEFAULT_SCORE,
            summary: PLACEHOLDER_SUMMARY.to_string(),
            suggestions: Vec::new(),
            issues: Vec::new(),
            security_findings: Vec::new(),
            raw: raw.into(),
        }
    }

    /// Bugs plus security findings
    pub fn issue_count(&self) -> usize {
        self.issues.len() + self.security_findings.len()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.security_findings.is_empty()
    }
}
