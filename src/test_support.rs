//! In-process stand-ins for the review backend and the sinks

use crate::client::Analyzer;
use crate::error::{ReviewError, ReviewResult, TransportKind};
use crate::review::RawAnalysis;
use crate::sinks::{BufferedOutput, DiagnosticCollection, MemoryReviewStore, ScoreBadges, Sinks};
use crate::workspace::CancelFlag;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Code containing this marker is rejected by [`ScriptedAnalyzer`]
pub const REJECT_MARKER: &str = "@@reject@@";

/// Answers every request with a fixed-shape JSON review, counting calls and
/// tracking how many were in flight at once.
pub struct ScriptedAnalyzer {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    healthy: bool,
    cancel_on_call: Option<CancelFlag>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(2),
            healthy: true,
            cancel_on_call: None,
        }
    }

    /// Hold every request open for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Trip `cancel` as soon as the first request is in flight
    pub fn cancelling(mut self, cancel: &CancelFlag) -> Self {
        self.cancel_on_call = Some(cancel.clone());
        self
    }

    pub fn unreachable() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, code: &str, language: Option<&str>) -> ReviewResult<RawAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(cancel) = &self.cancel_on_call {
            cancel.cancel();
        }

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if code.contains(REJECT_MARKER) {
            return Err(ReviewError::Rejected {
                status: 500,
                message: "Failed to analyze code".to_string(),
            });
        }

        Ok(RawAnalysis::Json(json!({
            "score": 7,
            "summary": format!("{} lines of {}", code.lines().count(), language.unwrap_or("code")),
            "bugs": [{"line": 1, "message": "first line looks suspicious"}],
            "suggestions": ["add tests"],
        })))
    }

    async fn health_check(&self) -> ReviewResult<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(ReviewError::Transport {
                url: "http://localhost:3000/health".to_string(),
                kind: TransportKind::Connect,
                detail: "connection refused".to_string(),
            })
        }
    }
}

/// Owns a full set of in-memory sinks
#[derive(Default)]
pub struct MemorySinks {
    pub diagnostics: DiagnosticCollection,
    pub store: MemoryReviewStore,
    pub output: BufferedOutput,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sinks<'a>(&'a self, badges: &'a ScoreBadges<'a>) -> Sinks<'a> {
        Sinks {
            diagnostics: &self.diagnostics,
            store: &self.store,
            decorations: badges,
            output: &self.output,
        }
    }
}
