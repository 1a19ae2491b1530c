//! Fetch strategies: one canonical interface, two ways to get a payload.

pub mod api;
pub mod html;

use async_trait::async_trait;

use crate::error::Result;
use crate::resolve::Resolved;
use crate::session::Session;

/// What a strategy hands to the classifier.
#[derive(Debug, Clone)]
pub enum RawPayload {
    /// Parsed JSON body from the signed private API.
    PrivateApiJson(serde_json::Value),
    /// Raw page text plus the URL it actually came from.
    ScrapedHtml { html: String, final_url: String },
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn fetch(&self, resolved: &Resolved, session: &Session) -> Result<RawPayload>;
}

/// Charset fallback chain for fetched pages: strict UTF-8, then GB18030,
/// then lossy UTF-8 as the last resort. Older share pages still come back
/// GB-encoded.
pub fn decode_body(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.trim_start_matches('\u{feff}').to_string();
    }
    let (text, _, had_errors) = encoding_rs::GB18030.decode(bytes);
    if !had_errors {
        return text.into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_and_strips_bom() {
        assert_eq!(decode_body("你好".as_bytes()), "你好");
        assert_eq!(decode_body(b"\xEF\xBB\xBFhello"), "hello");
    }

    #[test]
    fn falls_back_to_gb18030() {
        // "你好" in GB18030/GBK.
        assert_eq!(decode_body(&[0xC4, 0xE3, 0xBA, 0xC3]), "你好");
    }

    #[test]
    fn lossy_as_last_resort() {
        let text = decode_body(&[0xFF, 0x30, 0x80]);
        assert!(text.contains('\u{fffd}'));
    }
}
