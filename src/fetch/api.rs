use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LensError, Result};
use crate::fetch::{decode_body, FetchStrategy, RawPayload};
use crate::resolve::Resolved;
use crate::session::Session;
use crate::signing::SignatureEngine;

const API_BASE: &str = "https://www.douyin.com";
const API_PATH: &str = "/aweme/v1/web/aweme/detail/";
const API_REFERER: &str = "https://www.douyin.com/";

// Mirrors urllib quote: alphanumerics and `_.-~/` pass through.
const QUERY_ENC: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

// The token itself may contain `/` and `-`; encode everything non-trivial.
const TOKEN_ENC: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Private-API strategy: fixed web-app parameter set, signed query string,
/// JSON detail payload.
pub struct SignedApiFetcher {
    engine: Arc<SignatureEngine>,
    retries: u32,
    retry_delay: Duration,
}

impl SignedApiFetcher {
    pub fn new(engine: Arc<SignatureEngine>, retries: u32, retry_delay: Duration) -> Self {
        Self {
            engine,
            retries,
            retry_delay,
        }
    }

    /// Parameter order is part of what gets signed; keep it stable.
    fn build_query(aweme_id: &str, ms_token: &str) -> String {
        let params: [(&str, &str); 12] = [
            ("device_platform", "webapp"),
            ("aid", "6383"),
            ("channel", "channel_pc_web"),
            ("aweme_id", aweme_id),
            ("update_version_code", "170400"),
            ("pc_client_type", "1"),
            ("version_code", "190500"),
            ("version_name", "19.5.0"),
            ("cookie_enabled", "true"),
            ("platform", "PC"),
            ("downlink", "10"),
            ("msToken", ms_token),
        ];
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, QUERY_ENC)))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn attempt(&self, aweme_id: &str, session: &Session) -> Result<RawPayload> {
        let cookie_scope: Url = format!("{}{}", API_BASE, API_PATH)
            .parse()
            .expect("static api url");
        let ms_token = session
            .cookie_value(&cookie_scope, "msToken")
            .unwrap_or_default();

        let query = Self::build_query(aweme_id, &ms_token);
        let a_bogus = self.engine.sign(&query, "GET");
        let signed_query = format!(
            "{}&a_bogus={}",
            query,
            utf8_percent_encode(&a_bogus, TOKEN_ENC)
        );

        let endpoint = match session.relay() {
            Some(relay) => format!("{}/douyin{}", relay, API_PATH),
            None => format!("{}{}", API_BASE, API_PATH),
        };
        let url = format!("{}?{}", endpoint, signed_query);
        debug!(aweme_id, "fetching detail via signed api");

        let mut request = session
            .client()
            .get(&url)
            .header(reqwest::header::REFERER, API_REFERER);
        if session.relay().is_some() {
            // Relay requests leave the jar's origin, so the Cookie header
            // has to be attached by hand.
            if let Some(cookie) = session.cookie_header_for(&cookie_scope) {
                request = request.header(reqwest::header::COOKIE, cookie);
            }
        }
        let resp = request.send().await?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(LensError::HttpStatus {
                status,
                url: endpoint,
            });
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            // The endpoint answers a bad token with 200 and an empty body.
            return Err(LensError::SignatureRejected);
        }
        let body = decode_body(&bytes);
        let value: Value = serde_json::from_str(&body)
            .map_err(|_| LensError::SchemaMismatch("detail body is not json".into()))?;
        let value = unwrap_relay_payload(value)?;
        match value.get("aweme_detail") {
            Some(detail) if !detail.is_null() => Ok(RawPayload::PrivateApiJson(value)),
            _ => Err(LensError::SchemaMismatch("missing aweme_detail".into())),
        }
    }
}

/// The relay proxies the API verbatim but base64-wraps the body to dodge
/// edge compression: `{"data": <base64>, "encoding": "base64"}`. Anything
/// without the sentinel passes through untouched.
fn unwrap_relay_payload(value: Value) -> Result<Value> {
    if value.get("encoding").and_then(Value::as_str) != Some("base64") {
        return Ok(value);
    }
    let data = value
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| LensError::RelayRejected("missing data field".into()))?;
    let bytes = BASE64
        .decode(data.as_bytes())
        .map_err(|e| LensError::RelayRejected(format!("bad base64: {}", e)))?;
    let body = decode_body(&bytes);
    serde_json::from_str(&body)
        .map_err(|_| LensError::SchemaMismatch("relay payload is not json".into()))
}

#[async_trait]
impl FetchStrategy for SignedApiFetcher {
    async fn fetch(&self, resolved: &Resolved, session: &Session) -> Result<RawPayload> {
        let aweme_id = resolved
            .content_id
            .as_deref()
            .ok_or_else(|| LensError::MissingContentId(resolved.final_url.clone()))?;

        let attempts = self.retries.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.attempt(aweme_id, session).await {
                Err(e) if e.is_retryable_network() => {
                    warn!(attempt, error = %e, "api fetch failed, retrying");
                    last_err = Some(e);
                }
                other => return other,
            }
        }
        Err(last_err.unwrap_or(LensError::Network("api fetch failed".into())))
    }
}
