use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::{LensError, Result};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Douyin,
    Xiaohongshu,
}

// Scan order matters: douyin short links sometimes get pasted next to
// xiaohongshu text, and the first hit wins.
static DOUYIN_LINK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"https?://v\.douyin\.com/[a-zA-Z0-9_-]+/?",
        r"https?://(?:www\.)?douyin\.com/[^\s]+",
        r"https?://(?:www\.)?iesdouyin\.com/[^\s]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static XHS_LINK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"https?://(?:www\.)?xiaohongshu\.com/[^\s]+",
        r"https?://xhslink\.com/[^\s]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static PATH_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:video|note|slides)/(\d+)").expect("valid regex"));

static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:modal_id|mid|aweme_id)=(\d+)").expect("valid regex"));

/// Find the first supported share link in a free-form message.
pub fn scan_message(text: &str) -> Option<(Platform, String)> {
    for re in DOUYIN_LINK_RES.iter() {
        if let Some(m) = re.find(text) {
            return Some((Platform::Douyin, m.as_str().trim_end_matches(',').to_string()));
        }
    }
    for re in XHS_LINK_RES.iter() {
        if let Some(m) = re.find(text) {
            return Some((Platform::Xiaohongshu, m.as_str().to_string()));
        }
    }
    None
}

/// Pull the canonical numeric content id out of an expanded URL. Path
/// segments win over query parameters.
pub fn extract_content_id(url: &str) -> Option<String> {
    if let Some(caps) = PATH_ID_RE.captures(url) {
        return Some(caps[1].to_string());
    }
    QUERY_ID_RE.captures(url).map(|caps| caps[1].to_string())
}

/// Validated before any socket is opened, so junk and non-http schemes
/// never reach the network.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| LensError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        s => return Err(LensError::InvalidUrl(format!("unsupported scheme {}", s))),
    }
    if parsed.host_str().is_none() {
        return Err(LensError::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy)]
pub enum RedirectMode {
    /// Let the client chase the whole chain in one request.
    FollowAll,
    /// Walk hops one HEAD at a time, joining relative Locations.
    Manual { max_hops: usize },
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub final_url: String,
    pub content_id: Option<String>,
}

/// Expands short links to their canonical form over a session's clients.
pub struct Resolver<'a> {
    session: &'a Session,
    mode: RedirectMode,
    retries: u32,
    retry_delay: Duration,
}

impl<'a> Resolver<'a> {
    pub fn new(session: &'a Session, mode: RedirectMode, retries: u32, retry_delay: Duration) -> Self {
        Self {
            session,
            mode,
            retries,
            retry_delay,
        }
    }

    pub async fn resolve(&self, url: &str) -> Result<Resolved> {
        let parsed = validate_url(url)?;
        let attempts = self.retries.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.follow(&parsed).await {
                Ok(final_url) => {
                    let content_id = extract_content_id(&final_url);
                    debug!(%final_url, ?content_id, "redirects resolved");
                    return Ok(Resolved {
                        final_url,
                        content_id,
                    });
                }
                Err(e) if e.is_retryable_network() => {
                    warn!(attempt, error = %e, "redirect resolution failed, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(LensError::Network("redirect resolution failed".into())))
    }

    async fn follow(&self, url: &Url) -> Result<String> {
        match self.mode {
            RedirectMode::FollowAll => {
                let resp = self.session.client().head(url.clone()).send().await?;
                Ok(resp.url().to_string())
            }
            RedirectMode::Manual { max_hops } => {
                let mut current = url.clone();
                for _ in 0..max_hops {
                    let resp = self.session.bare_client().head(current.clone()).send().await?;
                    let status = resp.status();
                    if status.is_redirection() {
                        let Some(location) = resp
                            .headers()
                            .get(reqwest::header::LOCATION)
                            .and_then(|v| v.to_str().ok())
                        else {
                            return Ok(current.to_string());
                        };
                        // Location may be relative; resolve against the
                        // current hop like a browser would.
                        current = current
                            .join(location)
                            .map_err(|e| LensError::InvalidUrl(format!("{}: {}", location, e)))?;
                        continue;
                    }
                    // Success or not, a non-redirect terminates the chain.
                    return Ok(current.to_string());
                }
                Err(LensError::TooManyRedirects(max_hops))
            }
        }
    }
}
