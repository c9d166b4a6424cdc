//! Remote analysis collaborator
//!
//! The backend is a thin proxy in front of an LLM: `POST /review` takes
//! `{code, language}` and answers with whatever the model produced.

use crate::config::Config;
use crate::error::{ReviewError, ReviewResult, TransportKind};
use crate::retry::RetryPolicy;
use crate::review::RawAnalysis;
use crate::util::truncate_str;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Anything that can turn source code into a raw analysis payload
#[allow(async_fn_in_trait)]
pub trait Analyzer {
    async fn analyze(&self, code: &str, language: Option<&str>) -> ReviewResult<RawAnalysis>;

    /// Short pre-flight probe, run before touching any files
    async fn health_check(&self) -> ReviewResult<()>;
}

#[derive(Serialize)]
struct ReviewRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// HTTP client for the review backend
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
    health_timeout: Duration,
    retry: RetryPolicy,
}

impl BackendClient {
    pub fn new(base: Url, timeout: Duration, health_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            timeout,
            health_timeout,
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, String> {
        let base = Config::validate_backend_url(&config.backend_url)?;
        Ok(Self::new(
            base,
            config.request_timeout(),
            config.health_timeout(),
            config.retry_policy(),
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Join an endpoint onto the base, keeping any path prefix the base has
    fn endpoint(&self, name: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        format!("{}/{}", base, name)
    }

    async fn post_review(&self, url: &str, request: &ReviewRequest<'_>) -> ReviewResult<RawAnalysis> {
        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(url, &e))?;

        if status.is_success() {
            tracing::debug!("backend answered {} ({} bytes)", status, text.len());
            return Ok(RawAnalysis::from_body(&text));
        }

        Err(ReviewError::Rejected {
            status: status.as_u16(),
            message: rejection_message(status, &text),
        })
    }
}

impl Analyzer for BackendClient {
    async fn analyze(&self, code: &str, language: Option<&str>) -> ReviewResult<RawAnalysis> {
        let url = self.endpoint("review");
        let request = ReviewRequest { code, language };
        self.retry
            .run(
                |attempt| {
                    if attempt > 0 {
                        tracing::debug!("retrying POST {} (attempt {})", url, attempt + 1);
                    }
                    self.post_review(&url, &request)
                },
                ReviewError::is_transient,
            )
            .await
    }

    async fn health_check(&self) -> ReviewResult<()> {
        let url = self.endpoint("health");
        let response = self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(ReviewError::Rejected {
            status: status.as_u16(),
            message: rejection_message(status, &text),
        })
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> ReviewError {
    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_body() || err.is_decode() {
        TransportKind::Body
    } else {
        TransportKind::Connect
    };
    ReviewError::Transport {
        url: url.to_string(),
        kind,
        detail: err.to_string(),
    }
}

/// Describe a non-2xx response from its status and body
fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message", "detail"] {
            match map.get(key) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                    return s.trim().to_string()
                }
                Some(serde_json::Value::Object(inner)) => {
                    if let Some(serde_json::Value::String(s)) = inner.get("message") {
                        return s.trim().to_string();
                    }
                }
                _ => {}
            }
        }
    }
    if !body.is_empty() {
        return truncate_str(body, 200).to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}
