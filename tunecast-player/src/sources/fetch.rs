//! Page fetching for the scraping tiers and share-link expansion
//!
//! [`PageFetcher`] returns the rendered document of a page together with
//! the URL it finally landed on after redirects. [`HttpFetcher`] is the
//! reqwest-backed default; a headless-browser renderer can be plugged in
//! behind the same trait.

use super::{check_status, TierResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after following redirects
    pub final_url: String,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> TierResult<FetchedPage>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> TierResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> TierResult<FetchedPage> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.8")
            .send()
            .await?;
        let response = check_status(response)?;
        let final_url = response.url().to_string();
        let body = response.text().await?;

        debug!(url = %url, final_url = %final_url, bytes = body.len(), "Fetched page");
        Ok(FetchedPage { final_url, body })
    }
}
