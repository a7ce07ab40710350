use crate::error::{Error, Result};
use crate::metrics::catalog::API_UP;
use crate::metrics::{MetricKind, MetricSink};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of raw API payloads.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>>;
}

/// Authenticated client for the platform's `/api/` endpoints.
pub struct ApiClient {
    client: Client,
    host: String,
    base: Url,
    token: String,
    sink: Arc<dyn MetricSink>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(host: &str, token: &str, sink: Arc<dyn MetricSink>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("sesam-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            host: host.to_string(),
            base: api_base(host)?,
            token: token.to_string(),
            sink,
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        })
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Resolves `path` against the API base. Relative paths land under
    /// `/api/`, absolute ones at the host root.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn attempt(&self, url: &Url, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("bearer {}", self.token))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.record(path, "error");
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.record(path, status.as_str());
            let body = response.text().await.unwrap_or_default();
            log::warn!("Request to {} failed with {}: {}", url, status, body);
            return Err(Error::Status {
                path: path.to_string(),
                status,
            });
        }

        match response.bytes().await {
            Ok(body) => {
                self.record(path, status.as_str());
                Ok(body.to_vec())
            }
            Err(e) => {
                self.record(path, "error");
                Err(e.into())
            }
        }
    }

    fn record(&self, path: &str, status: &str) {
        self.sink.emit(
            API_UP,
            &[("host", self.host.as_str()), ("path", path), ("status", status)],
            1.0,
            MetricKind::Counter,
        );
    }
}

#[async_trait]
impl Fetch for ApiClient {
    async fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>> {
        let url = self.url_for(path)?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            log::debug!("Scraping {} (attempt {}/{})", url, attempt, self.max_attempts);

            match self.attempt(&url, path, query).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(Error::RetriesExhausted {
                        path: path.to_string(),
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    log::warn!("Attempt {} for {} failed: {}", attempt, url, e);
                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// `https://<host>/api/`, keeping an explicit scheme when the host has one.
fn api_base(host: &str) -> Result<Url> {
    let host = host.trim_end_matches('/');
    if host.is_empty() {
        return Err(Error::Config("missing variable 'host'".to_string()));
    }

    let root = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    Ok(Url::parse(&format!("{}/api/", root))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemorySink;

    fn client(host: &str) -> ApiClient {
        ApiClient::new(host, "token", Arc::new(MemorySink::new())).unwrap()
    }

    #[test]
    fn relative_paths_join_under_api() {
        let c = client("datahub-1.sesam.cloud");
        assert_eq!(
            c.url_for("pipes").unwrap().as_str(),
            "https://datahub-1.sesam.cloud/api/pipes"
        );
        assert_eq!(
            c.url_for("datasets").unwrap().as_str(),
            "https://datahub-1.sesam.cloud/api/datasets"
        );
    }

    #[test]
    fn absolute_paths_do_not_duplicate_prefix() {
        let c = client("datahub-1.sesam.cloud/");
        assert_eq!(
            c.url_for("/api/pipes").unwrap().as_str(),
            "https://datahub-1.sesam.cloud/api/pipes"
        );
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let c = client("http://127.0.0.1:9042");
        assert_eq!(c.url_for("pipes").unwrap().as_str(), "http://127.0.0.1:9042/api/pipes");
    }

    #[test]
    fn empty_host_is_rejected() {
        let result = ApiClient::new("", "token", Arc::new(MemorySink::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
