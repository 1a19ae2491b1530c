use serde::Deserialize;
use std::path::Path;

use crate::error::{LensError, Result};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";

/// Runtime knobs, loadable from a TOML file. Out-of-range numbers are
/// clamped rather than rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-request timeout for page and API fetches, seconds.
    pub common_timeout_secs: u64,
    /// Attempts for redirect resolution (network errors only).
    pub retry_times: u32,
    /// Linear backoff between retries, seconds.
    pub retry_delay_secs: u64,
    /// Hop bound for manual redirect following.
    pub max_redirect_hops: usize,
    /// Base URL of an optional forwarding relay; empty disables relay mode.
    pub relay_url: String,
    pub desktop_user_agent: String,
    pub mobile_user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            common_timeout_secs: 15,
            retry_times: 3,
            retry_delay_secs: 1,
            max_redirect_hops: 10,
            relay_url: String::new(),
            desktop_user_agent: DESKTOP_USER_AGENT.to_string(),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LensError::Config(format!("{}: {}", path.display(), e)))?;
        let cfg: Config =
            toml::from_str(&raw).map_err(|e| LensError::Config(e.to_string()))?;
        cfg.validated()
    }

    pub fn validated(mut self) -> Result<Self> {
        self.common_timeout_secs = self.common_timeout_secs.clamp(3, 300);
        self.retry_times = self.retry_times.clamp(0, 10);
        self.retry_delay_secs = self.retry_delay_secs.clamp(0, 30);
        self.max_redirect_hops = self.max_redirect_hops.clamp(1, 30);
        if !self.relay_url.is_empty() {
            let parsed = url::Url::parse(&self.relay_url)
                .map_err(|e| LensError::Config(format!("relay_url: {}", e)))?;
            match parsed.scheme() {
                "http" | "https" => {}
                s => {
                    return Err(LensError::Config(format!(
                        "relay_url scheme must be http(s), got {}",
                        s
                    )))
                }
            }
            // Trailing slash would double up when joining relay paths.
            self.relay_url = self.relay_url.trim_end_matches('/').to_string();
        }
        if self.desktop_user_agent.trim().is_empty() {
            self.desktop_user_agent = DESKTOP_USER_AGENT.to_string();
        }
        if self.mobile_user_agent.trim().is_empty() {
            self.mobile_user_agent = MOBILE_USER_AGENT.to_string();
        }
        Ok(self)
    }

    pub fn relay(&self) -> Option<&str> {
        if self.relay_url.is_empty() {
            None
        } else {
            Some(&self.relay_url)
        }
    }
}
