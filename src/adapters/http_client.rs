use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::config::NetworkConfig;
use crate::domain::source::truncate_chars;
use crate::domain::DomainError;
use crate::ports::HttpClient;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Longest slice of an unstructured error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// reqwest-backed HTTP client that every request in the app goes through.
///
/// Only http(s) URLs are allowed, and offline mode blocks everything.
pub struct GuardedHttpClient {
    client: Client,
    offline: AtomicBool,
    user_agent: String,
}

impl GuardedHttpClient {
    pub fn new(config: &NetworkConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DomainError::HttpRequest(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            offline = config.offline,
            timeout_secs = config.request_timeout_secs,
            "HTTP client initialized"
        );

        Ok(Self {
            client,
            offline: AtomicBool::new(config.offline),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Switch offline mode on or off.
    pub fn set_offline(&self, offline: bool) {
        let previous = self.offline.swap(offline, Ordering::SeqCst);
        if previous != offline {
            info!(offline, "HTTP client mode changed");
        }
    }

    fn check_url(&self, url: &str) -> Result<Url, DomainError> {
        if self.offline.load(Ordering::SeqCst) {
            warn!(url = %redact(url), "Network request blocked: offline mode enabled");
            return Err(DomainError::NetworkBlocked {
                reason: "Offline mode is enabled. All network requests are blocked.".to_string(),
            });
        }

        let parsed = Url::parse(url).map_err(|e| DomainError::InvalidUrl(format!("{}: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => {
                warn!(url = %redact(url), scheme, "Network request blocked: unsupported scheme");
                Err(DomainError::NetworkBlocked {
                    reason: format!("Scheme '{}' is not allowed", scheme),
                })
            }
        }
    }

    async fn send_get(&self, url: &str, accept: &str) -> Result<Response, DomainError> {
        let parsed = self.check_url(url)?;
        debug!(url = %redact(url), "GET");

        let response = self
            .client
            .get(parsed)
            .header(ACCEPT, accept)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| DomainError::HttpRequest(e.to_string()))?;

        ensure_success(response).await
    }
}

/// Turn a non-2xx response into [`DomainError::Api`].
async fn ensure_success(response: Response) -> Result<Response, DomainError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if !body.trim().is_empty() => {
            truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS).to_string()
        }
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    };

    Err(DomainError::Api {
        status: status.as_u16(),
        message,
    })
}

/// URL without its query string, for logs.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[async_trait]
impl HttpClient for GuardedHttpClient {
    async fn get(&self, url: &str) -> Result<String, DomainError> {
        self.send_get(url, PAGE_ACCEPT)
            .await?
            .text()
            .await
            .map_err(|e| DomainError::HttpRequest(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DomainError> {
        self.send_get(url, "application/json")
            .await?
            .json()
            .await
            .map_err(|e| DomainError::Serialization(e.to_string()))
    }

    async fn post_json<T: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<R, DomainError> {
        let parsed = self.check_url(url)?;
        debug!(url = %redact(url), "POST");

        let mut request = self.client.post(parsed).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::HttpRequest(e.to_string()))?;

        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::Serialization(e.to_string()))
    }

    fn is_network_blocked(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}
