use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::{debug, info};

use gleaner_core::config::LoaderConfig;
use gleaner_core::error::{GleanerError, Result};
use gleaner_core::traits::Fetcher;

use crate::markdown::{cut_noise, looks_like_html};

/// Whether a source locator carries a URL scheme (`https://`, `file://`, ...).
pub fn has_url_scheme(source: &str) -> bool {
    match source.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Fetches remote pages over HTTP and reads local files from disk.
pub struct HttpFetcher {
    http: Client,
    cut: bool,
}

impl HttpFetcher {
    /// `cut` strips script/style/noscript blocks from HTML content.
    pub fn new(cut: bool) -> Self {
        Self {
            http: Client::new(),
            cut,
        }
    }

    async fn fetch_url(&self, url: &str, options: &LoaderConfig) -> Result<String> {
        let mut req = self
            .http
            .get(url)
            .timeout(Duration::from_secs(options.timeout_secs))
            .header("User-Agent", options.user_agent.as_str());
        for (k, v) in &options.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| GleanerError::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GleanerError::Fetch(format!("{}: HTTP {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| GleanerError::Fetch(format!("{}: {}", url, e)))
    }

    async fn read_local(&self, path: &str) -> Result<String> {
        let path = path.strip_prefix("file://").unwrap_or(path);
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GleanerError::Fetch(format!("{}: {}", path, e)))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, source: &str, options: &LoaderConfig) -> BoxFuture<'_, Result<String>> {
        let source = source.to_string();
        let options = options.clone();

        Box::pin(async move {
            let remote = has_url_scheme(&source) && !source.starts_with("file://");
            let content = if remote {
                info!(url = %source, "Fetching document");
                self.fetch_url(&source, &options).await?
            } else {
                info!(path = %source, "Reading local document");
                self.read_local(&source).await?
            };

            debug!(bytes = content.len(), "Document loaded");

            if self.cut && looks_like_html(&content) {
                Ok(cut_noise(&content))
            } else {
                Ok(content)
            }
        })
    }
}
