use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LensError, Result};
use crate::fetch::{decode_body, FetchStrategy, RawPayload};
use crate::resolve::{Platform, Resolved};
use crate::session::Session;

const ROUTER_DATA_MARKER: &str = "window._ROUTER_DATA = ";
const SCRIPT_END_MARKER: &str = "}</script>";

/// Scrape strategy: fetch the share page and read the state the server
/// rendered into it. Works without any signing, at the cost of a thinner
/// payload. Douyin pages want a mobile user agent, xiaohongshu a desktop
/// one; the caller picks.
pub struct HtmlScrapeFetcher {
    platform: Platform,
    user_agent: String,
    retries: u32,
    retry_delay: Duration,
}

impl HtmlScrapeFetcher {
    pub fn new(
        platform: Platform,
        user_agent: String,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            platform,
            user_agent,
            retries,
            retry_delay,
        }
    }

    async fn attempt(&self, url: &reqwest::Url, session: &Session) -> Result<(Vec<u8>, String)> {
        match session.relay() {
            Some(relay) => {
                let headers = [("User-Agent", self.user_agent.clone())];
                let bytes = session.relay_fetch(relay, url, &headers).await?;
                Ok((bytes, url.to_string()))
            }
            None => {
                let resp = session
                    .client()
                    .get(url.clone())
                    .header(reqwest::header::USER_AGENT, &self.user_agent)
                    .header(
                        reqwest::header::ACCEPT,
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .header(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
                    .send()
                    .await?;
                let status = resp.status().as_u16();
                if status != 200 {
                    return Err(LensError::HttpStatus {
                        status,
                        url: url.to_string(),
                    });
                }
                let final_url = resp.url().to_string();
                Ok((resp.bytes().await?.to_vec(), final_url))
            }
        }
    }
}

#[async_trait]
impl FetchStrategy for HtmlScrapeFetcher {
    async fn fetch(&self, resolved: &Resolved, session: &Session) -> Result<RawPayload> {
        let url = crate::resolve::validate_url(&resolved.final_url)?;
        debug!(%url, platform = ?self.platform, "fetching share page");

        let attempts = self.retries.max(1);
        let mut last_err = None;
        let mut fetched = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.attempt(&url, session).await {
                Ok(ok) => {
                    fetched = Some(ok);
                    break;
                }
                Err(e) if e.is_retryable_network() => {
                    warn!(attempt, error = %e, "page fetch failed, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        let Some((bytes, final_url)) = fetched else {
            return Err(last_err.unwrap_or(LensError::Network("page fetch failed".into())));
        };

        let html = decode_body(&bytes);
        if self.platform == Platform::Douyin {
            // Fail fast here so the caller sees a fetch-level error rather
            // than a classifier mystery.
            extract_router_item(&html)?;
        }
        Ok(RawPayload::ScrapedHtml { html, final_url })
    }
}

/// Pull the first video/note item out of the page's embedded router state.
pub(crate) fn extract_router_item(html: &str) -> Result<(Value, &'static str)> {
    let start = html
        .find(ROUTER_DATA_MARKER)
        .ok_or(LensError::MarkerNotFound)?;
    let tail = &html[start + ROUTER_DATA_MARKER.len()..];
    let end = tail.find(SCRIPT_END_MARKER).ok_or(LensError::TruncatedJson)?;
    // Keep the closing brace, drop the script tag.
    let json_str = &tail[..end + 1];
    let router: Value = serde_json::from_str(json_str)
        .map_err(|_| LensError::SchemaMismatch("router state is not json".into()))?;
    let loader = router
        .get("loaderData")
        .and_then(Value::as_object)
        .ok_or_else(|| LensError::SchemaMismatch("missing loaderData".into()))?;

    for (key, val) in loader {
        let item = val
            .pointer("/videoInfoRes/item_list/0")
            .filter(|v| !v.is_null());
        let Some(item) = item else { continue };
        if key.contains("video") {
            return Ok((item.clone(), "video"));
        }
        if key.contains("note") {
            return Ok((item.clone(), "note"));
        }
    }
    Err(LensError::SchemaMismatch(
        "no video or note entry in loaderData".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn page(router_json: &str) -> String {
        format!(
            "<html><head></head><body><script>window._ROUTER_DATA = {}</script></body></html>",
            router_json
        )
    }

    #[test]
    fn extracts_video_item() {
        let html = page(
            r#"{"loaderData":{"video_(id)/page":{"videoInfoRes":{"item_list":[{"aweme_id":"7372484719365098803"}]}}}}"#,
        );
        let (item, kind) = extract_router_item(&html).unwrap();
        assert_eq!(kind, "video");
        assert_eq!(item["aweme_id"], "7372484719365098803");
    }

    #[test]
    fn extracts_note_item() {
        let html = page(
            r#"{"loaderData":{"note_(id)/page":{"videoInfoRes":{"item_list":[{"aweme_id":"1"}]}}}}"#,
        );
        let (_, kind) = extract_router_item(&html).unwrap();
        assert_eq!(kind, "note");
    }

    #[test]
    fn missing_marker() {
        let err = extract_router_item("<html>nothing here</html>").unwrap_err();
        assert!(matches!(err, LensError::MarkerNotFound));
    }

    #[test]
    fn truncated_state() {
        let html = "<script>window._ROUTER_DATA = {\"loaderData\":{";
        assert!(matches!(
            extract_router_item(html).unwrap_err(),
            LensError::TruncatedJson
        ));
    }

    #[test]
    fn unrecognized_keys() {
        let html = page(r#"{"loaderData":{"user_(id)/page":{"videoInfoRes":{"item_list":[{}]}}}}"#);
        assert!(matches!(
            extract_router_item(&html).unwrap_err(),
            LensError::SchemaMismatch(_)
        ));
    }

    /// Drops the first connection cold, serves the body on the second.
    async fn spawn_flaky_responder(body: String) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn retries_after_dropped_connection() {
        let addr = spawn_flaky_responder("<html>标题</html>".to_string()).await;
        let session = Session::new(&Config::default()).unwrap();
        let fetcher = HtmlScrapeFetcher::new(
            Platform::Xiaohongshu,
            "test-agent".into(),
            3,
            Duration::from_millis(10),
        );
        let resolved = Resolved {
            final_url: format!("http://{}/explore/abc", addr),
            content_id: None,
        };

        let payload = fetcher.fetch(&resolved, &session).await.unwrap();
        match payload {
            RawPayload::ScrapedHtml { html, .. } => assert!(html.contains("标题")),
            RawPayload::PrivateApiJson(_) => panic!("expected scraped html"),
        }
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        // Nothing listens here; every attempt is a connection error.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = Session::new(&Config::default()).unwrap();
        let fetcher = HtmlScrapeFetcher::new(
            Platform::Xiaohongshu,
            "test-agent".into(),
            2,
            Duration::from_millis(10),
        );
        let resolved = Resolved {
            final_url: format!("http://{}/explore/abc", addr),
            content_id: None,
        };
        let err = fetcher.fetch(&resolved, &session).await.unwrap_err();
        assert!(err.is_retryable_network());
    }
}
