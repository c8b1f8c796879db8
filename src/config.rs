//! Acquisition settings.
//!
//! Everything tunable lives in [`AcquireConfig`]. Durations are stored as
//! `*_ms` integers so the whole thing round-trips through JSON unchanged.

use crate::error::{AcquisitionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_USERNAME: &str = "INSTAGRAM_USERNAME";
pub const ENV_PASSWORD: &str = "INSTAGRAM_PASSWORD";
pub const ENV_PROXIES: &str = "MEDIAGRAB_PROXIES";
pub const ENV_BUDGET_SECS: &str = "MEDIAGRAB_BUDGET_SECS";

/// User agents used when none are configured.
pub fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1".into(),
        "Mozilla/5.0 (Android 12; Mobile; rv:91.0) Gecko/91.0 Firefox/91.0".into(),
        "Mozilla/5.0 (iPhone; CPU iPhone OS 15_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Mobile/15E148 Safari/604.1".into(),
        "Mozilla/5.0 (Linux; Android 11; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36".into(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".into(),
    ]
}

/// Login pair for the authenticated strategy.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Backoff settings for one strategy's retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub rate_limit_multiplier: f64,
    pub blocked_penalty_ms: u64,
    /// Fraction of the computed delay used as the jitter band (0.5 = ±50%)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 3_000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            rate_limit_multiplier: 4.0,
            blocked_penalty_ms: 120_000,
            jitter: 0.5,
        }
    }
}

/// Base URLs of the origin; overridable so tests can point at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub web: String,
    pub oembed: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            web: "https://www.instagram.com".into(),
            oembed: "https://api.instagram.com/oembed/".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    pub credentials: Option<Credentials>,
    /// Consecutive failures before an identity is left out of rotation
    pub failure_threshold: u32,
    pub request_timeout_ms: u64,
    /// Wall-clock budget for one acquire call
    pub budget_ms: u64,
    /// Strategy invocations allowed per acquire call
    pub max_total_attempts: u32,
    pub retry: RetryConfig,
    pub endpoints: Endpoints,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            proxies: Vec::new(),
            credentials: None,
            failure_threshold: 3,
            request_timeout_ms: 30_000,
            budget_ms: 240_000,
            max_total_attempts: 12,
            retry: RetryConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl AcquireConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON config file, then apply the environment on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AcquisitionError::Config(format!("{}: {e}", path.display())))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| AcquisitionError::Config(format!("{}: {e}", path.display())))?;
        Ok(cfg.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from any key/value source.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup(ENV_USERNAME).filter(|v| !v.trim().is_empty());
        let password = lookup(ENV_PASSWORD).filter(|v| !v.is_empty());
        if let (Some(username), Some(password)) = (username, password) {
            self.credentials = Some(Credentials {
                username: username.trim().to_string(),
                password,
            });
        }

        if let Some(list) = lookup(ENV_PROXIES) {
            let proxies: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            if !proxies.is_empty() {
                self.proxies = proxies;
            }
        }

        if let Some(secs) = lookup(ENV_BUDGET_SECS).and_then(|v| v.trim().parse::<u64>().ok()) {
            self.budget_ms = secs.saturating_mul(1_000);
        }

        self
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(AcquisitionError::Config(
                "retry.max_attempts must be > 0".into(),
            ));
        }
        if self.max_total_attempts == 0 {
            return Err(AcquisitionError::Config(
                "max_total_attempts must be > 0".into(),
            ));
        }
        if self.budget_ms == 0 || self.request_timeout_ms == 0 {
            return Err(AcquisitionError::Config(
                "budget_ms and request_timeout_ms must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(AcquisitionError::Config(
                "retry.jitter must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}
