use crate::errors::ClientUnavailable;
use crate::fallback::LocalCounter;
use crate::models::{CountResponse, IncrementResponse};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP client for the visitor service that degrades to a [`LocalCounter`]
/// whenever the service cannot be reached.
///
/// `base_url` is the API root, e.g. `http://localhost:3001/api`.
pub struct VisitorClient {
    http: reqwest::Client,
    base_url: String,
    fallback: LocalCounter,
}

impl VisitorClient {
    pub fn new(base_url: impl Into<String>, fallback: LocalCounter) -> reqwest::Result<Self> {
        Self::with_timeout(base_url, fallback, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        fallback: LocalCounter,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            fallback,
        })
    }

    pub fn fallback(&self) -> &LocalCounter {
        &self.fallback
    }

    pub async fn check_availability(&self) -> bool {
        match self.http.get(self.url("/visitors")).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("visitor service not available: {err}");
                false
            }
        }
    }

    pub async fn fetch_count(&self) -> u64 {
        match self.try_fetch_count().await {
            Ok(count) => count,
            Err(err) => {
                debug!("{err}, using local count");
                self.fallback.count().await
            }
        }
    }

    /// Meant to be called once per session.
    pub async fn increment_count(&self, page_url: &str) -> u64 {
        if !self.check_availability().await {
            debug!("using local counter, visitor service unavailable");
            return self.fallback.register_visit().await;
        }

        match self.try_increment(page_url).await {
            Ok(response) => response.count,
            Err(err) => {
                debug!("{err}, using local counter");
                self.fallback.register_visit().await
            }
        }
    }

    async fn try_fetch_count(&self) -> Result<u64, ClientUnavailable> {
        let response: CountResponse = self
            .http
            .get(self.url("/visitors"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.count)
    }

    async fn try_increment(&self, page_url: &str) -> Result<IncrementResponse, ClientUnavailable> {
        let response = self
            .http
            .post(self.url("/visitors/increment"))
            .json(&json!({ "pageUrl": page_url }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}
