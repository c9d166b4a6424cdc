//! Configuration management for codecritic
//!
//! Stores settings in ~/.config/codecritic/config.json

use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_CONCURRENCY: usize = 3;

const BACKEND_URL_ENV: &str = "CODECRITIC_BACKEND_URL";
const TIMEOUT_ENV: &str = "CODECRITIC_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the review backend (`/review` and `/health` live under it)
    pub backend_url: String,
    /// Timeout for a single review request
    pub request_timeout_ms: u64,
    /// Timeout for the pre-flight health probe
    pub health_timeout_ms: u64,
    /// Files reviewed at once during a workspace run
    pub concurrency: usize,
    /// Retries after a transport failure
    pub max_retries: u32,
    /// Delay before the first retry; later retries wait linearly longer
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_ms: 60_000,
            health_timeout_ms: 3_000,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: 2,
            retry_delay_ms: 1_000,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("codecritic"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk (or defaults), then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::load_saved();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load only what is on disk, for editing and saving back
    pub fn load_saved() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        tracing::warn!(
                            "config file was corrupted ({}); a backup was saved and defaults were loaded",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Environment variables win over the file
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.request_timeout_ms = ms,
                _ => tracing::warn!("ignoring invalid {}={:?}", TIMEOUT_ENV, raw),
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        #[cfg(unix)]
        {
            write_config_atomic(&path, &content)
                .map_err(|e| format!("Failed to write config: {}", e))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        }

        Ok(())
    }

    /// Check the backend URL parses and is http(s)
    pub fn validate_backend_url(url: &str) -> Result<url::Url, String> {
        let parsed = url::Url::parse(url.trim())
            .map_err(|e| format!("Invalid backend URL {:?}: {}", url, e))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(format!(
                "Backend URL must use http or https, got {:?}",
                other
            )),
        }
    }

    /// Request timeouts must be at least one millisecond
    pub fn validate_timeout_ms(ms: u64) -> Result<u64, String> {
        if ms == 0 {
            Err("Timeout must be greater than zero".to_string())
        } else {
            Ok(ms)
        }
    }

    /// Concurrency bound, never below one
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
            Backoff::Linear,
        )
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/codecritic/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(unix)]
fn write_config_atomic(path: &std::path::Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
        tracing::warn!("failed to set temp config file permissions: {}", e);
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.effective_concurrency(), 3);
        assert_eq!(config.retry_policy().max_retries, 2);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"concurrency": 0}"#).unwrap();
        assert_eq!(config.concurrency, 0);
        assert_eq!(config.effective_concurrency(), 1);
        assert_eq!(config.request_timeout_ms, 60_000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (BACKEND_URL_ENV, " https://review.internal:8443 "),
            (TIMEOUT_ENV, "1500"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.backend_url, "https://review.internal:8443");
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));

        let mut untouched = Config::default();
        untouched.apply_env(|k| (k == TIMEOUT_ENV).then(|| "soon".to_string()));
        assert_eq!(untouched.request_timeout_ms, 60_000);
    }

    #[test]
    fn test_validate_backend_url() {
        assert!(Config::validate_backend_url("http://localhost:3000").is_ok());
        assert!(Config::validate_backend_url("ftp://example.com").is_err());
        assert!(Config::validate_backend_url("not a url").is_err());
    }

    #[test]
    fn test_validate_timeout_ms() {
        assert_eq!(Config::validate_timeout_ms(1), Ok(1));
        assert_eq!(Config::validate_timeout_ms(60_000), Ok(60_000));
        assert!(Config::validate_timeout_ms(0).is_err());
    }
}
