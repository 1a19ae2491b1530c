pub mod classify;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod repair;
pub mod resolve;
pub mod session;
pub mod signing;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::descriptor::{
        Author, ContentKind, Download, DownloadItem, MediaDescriptor, MusicInfo, Statistics,
    };
    pub use crate::error::{LensError, Result};
    pub use crate::resolve::Platform;
    pub use crate::LinkLens;
}

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::classify::MediaClassifier;
use crate::config::Config;
use crate::descriptor::MediaDescriptor;
use crate::error::{LensError, Result};
use crate::fetch::api::SignedApiFetcher;
use crate::fetch::html::HtmlScrapeFetcher;
use crate::fetch::FetchStrategy;
use crate::normalize::ResponseNormalizer;
use crate::resolve::{Platform, RedirectMode, Resolver};
use crate::session::Session;
use crate::signing::SignatureEngine;

/// Top-level entry point. Owns the config and the signature engine (the
/// engine caches the user-agent digest, so it is built once and shared);
/// every resolution gets its own short-lived session so cookie state never
/// crosses between links.
pub struct LinkLens {
    config: Config,
    engine: Arc<SignatureEngine>,
}

impl LinkLens {
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validated()?;
        let engine = Arc::new(SignatureEngine::new(&config.desktop_user_agent));
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scan a free-form message for a supported share link and resolve it.
    pub async fn resolve_message(&self, text: &str) -> Result<MediaDescriptor> {
        let (platform, url) = resolve::scan_message(text).ok_or(LensError::UnsupportedLink)?;
        debug!(?platform, %url, "link found in message");
        self.resolve_url(platform, &url).await
    }

    pub async fn resolve_url(&self, platform: Platform, url: &str) -> Result<MediaDescriptor> {
        let session = Session::new(&self.config)?;
        let classification = match platform {
            Platform::Douyin => self.fetch_douyin(&session, url).await?,
            Platform::Xiaohongshu => self.fetch_xiaohongshu(&session, url).await?,
        };
        Ok(ResponseNormalizer::normalize(classification))
    }

    /// Signed private API first; on a permanent failure (bad signature,
    /// schema drift, 4xx) fall back to scraping the share page.
    async fn fetch_douyin(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<classify::Classification> {
        session.bootstrap_tokens().await;
        let resolver = Resolver::new(
            session,
            RedirectMode::FollowAll,
            self.config.retry_times,
            Duration::from_secs(self.config.retry_delay_secs),
        );
        let resolved = resolver.resolve(url).await?;

        let api = SignedApiFetcher::new(
            self.engine.clone(),
            self.config.retry_times,
            Duration::from_secs(self.config.retry_delay_secs),
        );
        let payload = match api.fetch(&resolved, session).await {
            Ok(payload) => payload,
            Err(e) if e.is_permanent() => {
                warn!(error = %e, "signed api failed, falling back to page scrape");
                let scraper = HtmlScrapeFetcher::new(
                    Platform::Douyin,
                    self.config.mobile_user_agent.clone(),
                    self.config.retry_times,
                    Duration::from_secs(self.config.retry_delay_secs),
                );
                scraper.fetch(&resolved, session).await?
            }
            Err(e) => return Err(e),
        };
        MediaClassifier::classify(&payload)
    }

    async fn fetch_xiaohongshu(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<classify::Classification> {
        let resolver = Resolver::new(
            session,
            RedirectMode::Manual {
                max_hops: self.config.max_redirect_hops,
            },
            self.config.retry_times,
            Duration::from_secs(self.config.retry_delay_secs),
        );
        let resolved = resolver.resolve(url).await?;
        let scraper = HtmlScrapeFetcher::new(
            Platform::Xiaohongshu,
            self.config.desktop_user_agent.clone(),
            self.config.retry_times,
            Duration::from_secs(self.config.retry_delay_secs),
        );
        let payload = scraper.fetch(&resolved, session).await?;
        MediaClassifier::classify(&payload)
    }
}
