//! Per-file review pipeline
//!
//! eligibility -> empty check -> cache -> backend -> normalize -> cache -> sinks.
//! Every step before the backend call can end the pipeline early, and nothing
//! is published until the backend has answered.

use crate::cache::{CacheKey, ReviewCache};
use crate::client::Analyzer;
use crate::eligibility;
use crate::error::{ReviewError, ReviewResult};
use crate::review::{normalize, CanonicalReview};
use crate::sinks::Sinks;
use crate::util::display_path;
use serde::Serialize;
use std::path::Path;

pub use crate::eligibility::SkipReason;

/// Everything a single file review needs, created once per session and
/// shared by reference across every pipeline run in it.
pub struct ReviewContext<'a, A> {
    pub analyzer: &'a A,
    pub cache: &'a ReviewCache,
    pub sinks: Sinks<'a>,
    /// Workspace root, used for eligibility and display paths
    pub root: Option<&'a Path>,
}

impl<A> Clone for ReviewContext<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for ReviewContext<'_, A> {}

impl<'a, A: Analyzer> ReviewContext<'a, A> {
    pub fn new(analyzer: &'a A, cache: &'a ReviewCache, sinks: Sinks<'a>) -> Self {
        Self {
            analyzer,
            cache,
            sinks,
            root: None,
        }
    }

    pub fn with_root(mut self, root: &'a Path) -> Self {
        self.root = Some(root);
        self
    }
}

/// Outcome of a pipeline run that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileReview {
    Reviewed {
        review: CanonicalReview,
        /// Served from the session cache without a backend call
        cached: bool,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl FileReview {
    pub fn review(&self) -> Option<&CanonicalReview> {
        match self {
            FileReview::Reviewed { review, .. } => Some(review),
            FileReview::Skipped { .. } => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, FileReview::Reviewed { cached: true, .. })
    }
}

/// Review one file
pub async fn review_file<A: Analyzer>(
    ctx: ReviewContext<'_, A>,
    path: &Path,
) -> ReviewResult<FileReview> {
    let shown = display_path(path, ctx.root);

    let language = match eligibility::check(path, ctx.root) {
        Ok(language) => language,
        Err(reason) => {
            tracing::debug!("skipping {}: {}", shown.display(), reason);
            return Ok(FileReview::Skipped { reason });
        }
    };

    let bytes = tokio::fs::read(path).await.map_err(|source| ReviewError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);

    if content.trim().is_empty() {
        tracing::debug!("skipping {}: empty", shown.display());
        return Ok(FileReview::Skipped {
            reason: SkipReason::Empty,
        });
    }

    let key = CacheKey::new(path, &content);
    if let Some(review) = ctx.cache.get(&key) {
        tracing::debug!("cache hit for {} ({})", shown.display(), key.fingerprint);
        ctx.sinks.publish(shown, &review);
        return Ok(FileReview::Reviewed {
            review,
            cached: true,
        });
    }

    tracing::info!(
        "reviewing {} ({}, {} bytes)",
        shown.display(),
        language,
        content.len()
    );
    let raw = match ctx.analyzer.analyze(&content, Some(language)).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("review of {} failed: {}", shown.display(), err);
            return Err(err);
        }
    };

    let review = ctx.cache.store(key, normalize(&raw));
    ctx.sinks.publish(shown, &review);
    ctx.sinks.output.line(&format!(
        "Reviewed {}: {}/10, {} issue(s), {} suggestion(s)",
        shown.display(),
        review.score,
        review.issue_count(),
        review.suggestions.len()
    ));

    Ok(FileReview::Reviewed {
        review,
        cached: false,
    })
}
