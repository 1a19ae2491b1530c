use thiserror::Error;

pub type Result<T> = std::result::Result<T, LensError>;

/// Failure taxonomy for the resolve -> fetch -> classify pipeline.
#[derive(Debug, Error)]
pub enum LensError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no supported link found in message")]
    UnsupportedLink,

    #[error("no canonical content id in {0}")]
    MissingContentId(String),

    #[error("redirect chain exceeded {0} hops")]
    TooManyRedirects(usize),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("signature rejected by remote endpoint")]
    SignatureRejected,

    #[error("embedded state marker not found in page")]
    MarkerNotFound,

    #[error("embedded state json is truncated")]
    TruncatedJson,

    #[error("payload schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("relay rejected request: {0}")]
    RelayRejected(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LensError {
    /// Permanent errors are not worth retrying with the same strategy;
    /// the caller should fall back to the next strategy or give up.
    pub fn is_permanent(&self) -> bool {
        match self {
            LensError::InvalidUrl(_)
            | LensError::UnsupportedLink
            | LensError::MissingContentId(_)
            | LensError::TooManyRedirects(_)
            | LensError::SignatureRejected
            | LensError::MarkerNotFound
            | LensError::TruncatedJson
            | LensError::SchemaMismatch(_)
            | LensError::Config(_)
            | LensError::Json(_) => true,
            LensError::HttpStatus { status, .. } => (400..500).contains(status),
            LensError::Timeout(_) | LensError::Network(_) | LensError::RelayRejected(_) => false,
        }
    }

    /// Network-level failures that the resolver retries with backoff.
    pub fn is_retryable_network(&self) -> bool {
        matches!(self, LensError::Timeout(_) | LensError::Network(_))
    }
}

impl From<reqwest::Error> for LensError {
    fn from(e: reqwest::Error) -> Self {
        let url = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        if e.is_timeout() {
            LensError::Timeout(url)
        } else if let Some(status) = e.status() {
            LensError::HttpStatus {
                status: status.as_u16(),
                url,
            }
        } else {
            LensError::Network(e.to_string())
        }
    }
}
