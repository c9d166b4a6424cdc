//! Workspace batch review
//!
//! Discovers eligible files under one or more roots and runs the per-file
//! pipeline over them in fixed-size batches. Within a batch every file is in
//! flight at once; the next batch starts only after the whole batch settles,
//! so at most `concurrency` backend calls are ever outstanding.

use crate::client::Analyzer;
use crate::eligibility::{self, is_ignored_dir, SkipReason};
use crate::error::{ReviewError, ReviewResult};
use crate::pipeline::{review_file, FileReview, ReviewContext};
use crate::review::CanonicalReview;
use crate::util::display_path;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;
use walkdir::WalkDir;

// ═══════════════════════════════════════════════════════════════════════════
//  DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════

/// A file found under one of the workspace roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub root: PathBuf,
    pub path: PathBuf,
}

/// Eligible files under `roots`, each root walked in file-name order.
/// A file reachable from two overlapping roots is listed once.
pub fn discover(roots: &[PathBuf]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.file_name().to_str().is_some_and(is_ignored_dir)
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if eligibility::check(path, Some(root.as_path())).is_err() {
                continue;
            }
            if seen.insert(path.to_path_buf()) {
                candidates.push(Candidate {
                    root: root.clone(),
                    path: path.to_path_buf(),
                });
            }
        }
    }

    candidates
}

// ═══════════════════════════════════════════════════════════════════════════
//  SESSION STATE
// ═══════════════════════════════════════════════════════════════════════════

/// Cooperative cancellation, checked between batches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Emitted after each batch settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// 1-based
    pub batch: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Reviewed {
        review: CanonicalReview,
        cached: bool,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        message: String,
    },
}

impl From<ReviewResult<FileReview>> for Outcome {
    fn from(result: ReviewResult<FileReview>) -> Self {
        match result {
            Ok(FileReview::Reviewed { review, cached }) => Outcome::Reviewed { review, cached },
            Ok(FileReview::Skipped { reason }) => Outcome::Skipped { reason },
            Err(err) => Outcome::Failed {
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    /// Relative to the root the file was found under
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of a workspace run, outcomes in discovery order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Eligible files discovered
    pub total: usize,
    /// Files that produced a review (fresh or cached)
    pub scanned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cached: usize,
    pub issue_count: usize,
    pub suggestion_count: usize,
    pub elapsed_ms: u64,
    pub cancelled: bool,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    pub(crate) fn start(total: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            total,
            scanned: 0,
            skipped: 0,
            failed: 0,
            cached: 0,
            issue_count: 0,
            suggestion_count: 0,
            elapsed_ms: 0,
            cancelled: false,
            outcomes: Vec::with_capacity(total),
        }
    }

    pub(crate) fn record(&mut self, path: PathBuf, outcome: Outcome) {
        match &outcome {
            Outcome::Reviewed { review, cached } => {
                self.scanned += 1;
                self.issue_count += review.issue_count();
                self.suggestion_count += review.suggestions.len();
                if *cached {
                    self.cached += 1;
                }
            }
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(FileOutcome { path, outcome });
    }

    /// Files whose outcome has been recorded
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ORCHESTRATION
// ═══════════════════════════════════════════════════════════════════════════

/// Review every eligible file under `roots`.
///
/// Fails only when the backend health probe fails; per-file failures are
/// recorded in the summary and the run continues.
pub async fn review_workspace<A: Analyzer>(
    ctx: ReviewContext<'_, A>,
    roots: &[PathBuf],
    concurrency: usize,
    cancel: &CancelFlag,
    mut on_progress: impl FnMut(&Progress),
) -> ReviewResult<BatchSummary> {
    ctx.analyzer.health_check().await?;

    let candidates = discover(roots);
    let mut summary = BatchSummary::start(candidates.len());
    let span = tracing::info_span!("workspace", session = %summary.session_id);

    async {
        let started = Instant::now();
        let size = concurrency.max(1);
        let batches = candidates.len().div_ceil(size);

        tracing::info!(
            "{} candidate files in {} batches of up to {}",
            candidates.len(),
            batches,
            size
        );
        ctx.sinks.output.line(&format!(
            "Reviewing {} file(s), {} at a time",
            candidates.len(),
            size
        ));

        for (batch_index, batch) in candidates.chunks(size).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("cancelled before batch {}/{}", batch_index + 1, batches);
                summary.cancelled = true;
                break;
            }

            let offset = batch_index * size;
            let futures = batch.iter().enumerate().map(|(i, candidate)| {
                let file_ctx = ctx.with_root(&candidate.root);
                async move { (offset + i, review_file(file_ctx, &candidate.path).await) }
            });
            let mut results = futures::future::join_all(futures).await;
            results.sort_by_key(|(index, _)| *index);

            for (index, result) in results {
                let candidate = &candidates[index];
                let shown = display_path(&candidate.path, Some(candidate.root.as_path())).to_path_buf();
                if let Err(err) = &result {
                    report_failure(ctx, &shown, err);
                }
                summary.record(shown, Outcome::from(result));
            }

            on_progress(&Progress {
                completed: summary.completed(),
                total: summary.total,
                batch: batch_index + 1,
                batches,
            });
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        if summary.cancelled {
            ctx.sinks.output.line(&format!(
                "Cancelled after {} of {} file(s)",
                summary.completed(),
                summary.total
            ));
        }
        tracing::info!(
            "done: {} scanned, {} skipped, {} failed, {} cached in {}ms",
            summary.scanned,
            summary.skipped,
            summary.failed,
            summary.cached,
            summary.elapsed_ms
        );
    }
    .instrument(span)
    .await;

    Ok(summary)
}

fn report_failure<A>(ctx: ReviewContext<'_, A>, shown: &Path, err: &ReviewError) {
    ctx.sinks
        .output
        .line(&format!("Failed {}: {}", shown.display(), err.status_message()));
}
