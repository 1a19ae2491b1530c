use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{LensError, Result};

const TTWID_REGISTER_URL: &str = "https://ttwid.bytedance.com/ttwid/union/register/";
const MS_TOKEN_LEN: usize = 156;

/// HTTP state scoped to a single resolution: one cookie jar shared by an
/// auto-redirecting client and a no-redirect client, plus the bootstrap
/// tokens the private API expects. Dropped when the resolution finishes so
/// cookies never leak between unrelated links.
pub struct Session {
    client: Client,
    bare: Client,
    jar: Arc<Jar>,
    relay: Option<String>,
    timeout: Duration,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let timeout = Duration::from_secs(config.common_timeout_secs);
        let client = Client::builder()
            .user_agent(config.desktop_user_agent.clone())
            .cookie_provider(jar.clone())
            .redirect(Policy::limited(config.max_redirect_hops))
            .timeout(timeout)
            .build()
            .map_err(|e| LensError::Config(e.to_string()))?;
        let bare = Client::builder()
            .user_agent(config.desktop_user_agent.clone())
            .cookie_provider(jar.clone())
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| LensError::Config(e.to_string()))?;
        Ok(Self {
            client,
            bare,
            jar,
            relay: config.relay().map(str::to_string),
            timeout,
        })
    }

    /// Client that follows redirects and carries the jar.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Client that never follows redirects, for manual hop walking.
    pub fn bare_client(&self) -> &Client {
        &self.bare
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn relay(&self) -> Option<&str> {
        self.relay.as_deref()
    }

    /// Seed the jar with a fresh `msToken` and register a `ttwid`. The API
    /// rejects anonymous sessions; a failed registration is logged and
    /// tolerated since the scrape fallback does not need it.
    pub async fn bootstrap_tokens(&self) {
        let ms_token = random_ms_token();
        self.set_cookie("msToken", &ms_token, ".douyin.com");

        let body = serde_json::json!({
            "region": "cn",
            "aid": 1768,
            "needFid": false,
            "service": "www.ixigua.com",
            "migrate_info": {"ticket": "", "source": "node"},
            "cbUrlProtocol": "https",
            "union": true,
        });

        let register_url = match &self.relay {
            Some(relay) => format!("{}/ttwid/ttwid/union/register/", relay),
            None => TTWID_REGISTER_URL.to_string(),
        };

        let resp = match self.client.post(&register_url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "ttwid registration failed");
                return;
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            warn!(status = %resp.status(), "ttwid registration rejected");
            return;
        }
        if self.relay.is_some() {
            // The relay is a different origin, so the jar files the cookie
            // under the wrong domain; lift ttwid out by hand.
            for value in resp.headers().get_all(reqwest::header::SET_COOKIE) {
                let Ok(raw) = value.to_str() else { continue };
                if let Some(ttwid) = raw
                    .split(';')
                    .next()
                    .and_then(|pair| pair.trim().strip_prefix("ttwid="))
                {
                    self.set_cookie("ttwid", ttwid, ".douyin.com");
                    break;
                }
            }
        }
        debug!("session tokens bootstrapped");
    }

    pub fn set_cookie(&self, name: &str, value: &str, domain: &str) {
        // The jar needs a URL to scope the cookie; domain attr widens it.
        let scope: Url = format!("https://www{}/", domain)
            .parse()
            .expect("static cookie scope url");
        self.jar
            .add_cookie_str(&format!("{}={}; Domain={}; Path=/", name, value, domain), &scope);
    }

    /// The `Cookie:` header value the jar would send to `url`, for relay
    /// requests where the jar cannot attach it automatically.
    pub fn cookie_header_for(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|v| v.to_str().map(str::to_string).ok())
    }

    /// A single cookie value as the jar would present it to `url`.
    pub fn cookie_value(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.cookie_header_for(url)?;
        header.split(';').find_map(|pair| {
            pair.trim()
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
                .map(str::to_string)
        })
    }

    /// Fetch a page body through the relay's `/download` endpoint.
    pub async fn relay_fetch(
        &self,
        relay: &str,
        target: &Url,
        extra_headers: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let mut headers = serde_json::Map::new();
        if let Some(cookie) = self.cookie_header_for(target) {
            headers.insert("Cookie".into(), cookie.into());
        }
        for (name, value) in extra_headers {
            headers.insert((*name).into(), value.clone().into());
        }
        let body = serde_json::json!({
            "url": target.as_str(),
            "headers": headers,
        });
        let resp = self
            .client
            .post(format!("{}/download", relay))
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(LensError::HttpStatus {
                status,
                url: target.to_string(),
            });
        }
        let envelope: RelayEnvelope = resp.json().await?;
        envelope.into_bytes()
    }
}

#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl RelayEnvelope {
    fn into_bytes(self) -> Result<Vec<u8>> {
        if !self.success {
            return Err(LensError::RelayRejected(
                self.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        let content = self
            .content
            .ok_or_else(|| LensError::RelayRejected("missing content".to_string()))?;
        match self.encoding.as_deref() {
            Some("base64") => BASE64
                .decode(content.as_bytes())
                .map_err(|e| LensError::RelayRejected(format!("bad base64: {}", e))),
            _ => Ok(content.into_bytes()),
        }
    }
}

pub fn random_ms_token() -> String {
    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::rng();
    (0..MS_TOKEN_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}
