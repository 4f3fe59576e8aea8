//! Long-URL shortening through an is.gd-compatible service.

use crate::config::ShortenerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ShortenError {
    #[error("shortening request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("shortener returned HTTP status code {0}")]
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct Shortener {
    http: reqwest::Client,
    endpoint: String,
    threshold: usize,
}

impl Shortener {
    pub fn new(http: reqwest::Client, config: &ShortenerConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            threshold: config.threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether `url` is long enough to be sent to the service.
    pub fn needs_shortening(&self, url: &str) -> bool {
        url.len() > self.threshold
    }

    /// The URL to show in chat: the service's answer for long URLs, the URL
    /// itself otherwise.
    pub async fn display_url(&self, url: &str) -> Result<String, ShortenError> {
        if !self.needs_shortening(url) {
            return Ok(url.to_string());
        }
        self.shorten(url).await
    }

    /// Ask the service unconditionally. The response body is used verbatim.
    pub async fn shorten(&self, url: &str) -> Result<String, ShortenError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("format", "simple"), ("url", url)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ShortenError::Status(status.as_u16()));
        }

        let short = resp.text().await?;
        tracing::debug!(url, short = %short, "Shortened URL");
        Ok(short)
    }
}
