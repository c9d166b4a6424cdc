//! Error taxonomy for the review layer
//!
//! Only failures the caller must act on live here. Malformed backend
//! payloads are absorbed by the normalizer and ineligible files are
//! ordinary [`crate::pipeline::SkipReason`] values.

use std::path::PathBuf;
use thiserror::Error;

/// Connectivity-level failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Refused, unreachable host, DNS failure
    Connect,
    /// Request exceeded its timeout
    Timeout,
    /// Connection dropped while reading the body
    Body,
}

impl TransportKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::Connect => "connection failed",
            TransportKind::Timeout => "timed out",
            TransportKind::Body => "connection dropped",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Cannot connect to review backend at {url} ({}): {detail}", .kind.label())]
    Transport {
        url: String,
        kind: TransportKind,
        detail: String,
    },

    #[error("Review backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReviewError {
    /// Only transport failures are worth retrying; a rejection with a body
    /// will come back the same way.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReviewError::Transport { .. })
    }

    /// Short single-line message for transient status output
    pub fn status_message(&self) -> String {
        match self {
            ReviewError::Transport { url, .. } => {
                format!("Cannot connect to review backend at {}", url)
            }
            ReviewError::Rejected { status, .. } => {
                format!("Review failed: backend returned {}", status)
            }
            ReviewError::Io { path, .. } => format!("Could not read {}", path.display()),
        }
    }
}

pub type ReviewResult<T> = Result<T, ReviewError>;
