use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::config::{ProxyConfig, ProxyFormat, SourceConfig};
use crate::domain::html::{extract_readable_text, MIN_MAIN_CONTENT_CHARS};
use crate::domain::source::MIN_SOURCE_CHARS;
use crate::domain::{DomainError, SourceDocument, SourceInput};
use crate::ports::HttpClient;

/// Envelope returned by JSON-style proxies.
#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    contents: Option<String>,
}

/// Resolves exactly one user input into a [`SourceDocument`].
pub struct SourceAcquirer<H: HttpClient> {
    http: Arc<H>,
    proxies: Vec<ProxyConfig>,
}

impl<H: HttpClient> SourceAcquirer<H> {
    pub fn new(http: Arc<H>, config: &SourceConfig) -> Self {
        Self {
            http,
            proxies: config.proxies.clone(),
        }
    }

    pub async fn acquire(&self, input: &SourceInput) -> Result<SourceDocument, DomainError> {
        let text = match input {
            SourceInput::Pasted(text) => text.trim().to_string(),
            SourceInput::File(path) => read_text_file(path).await?,
            SourceInput::Url(url) => self.fetch_url(url).await?,
        };

        let document = SourceDocument::new(&text, input.origin())?;
        info!(
            origin = ?document.origin(),
            chars = document.char_len(),
            truncated = document.was_truncated(),
            "Source resolved"
        );
        Ok(document)
    }

    /// Direct fetch first, then each proxy in order.
    async fn fetch_url(&self, raw_url: &str) -> Result<String, DomainError> {
        let url = Url::parse(raw_url.trim())
            .map_err(|e| DomainError::InvalidUrl(format!("{}: {}", raw_url.trim(), e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DomainError::InvalidUrl(format!(
                "{}: only http and https addresses can be fetched",
                url
            )));
        }

        match self.fetch_direct(url.as_str()).await {
            Ok(text) => return Ok(text),
            Err(e) => warn!(url = %url, error = %e, "Direct fetch failed, trying proxies"),
        }

        for (index, proxy) in self.proxies.iter().enumerate() {
            match self.fetch_via_proxy(proxy, url.as_str()).await {
                Ok(text) => {
                    info!(url = %url, proxy = %proxy.url, "Fetched through proxy");
                    return Ok(text);
                }
                Err(e) => warn!(
                    url = %url,
                    proxy = %proxy.url,
                    attempt = index + 1,
                    error = %e,
                    "Proxy fetch failed"
                ),
            }
        }

        Err(DomainError::UrlFetch {
            url: url.to_string(),
        })
    }

    async fn fetch_direct(&self, url: &str) -> Result<String, DomainError> {
        let html = self.http.get(url).await?;
        usable_text(&html, MIN_MAIN_CONTENT_CHARS)
    }

    async fn fetch_via_proxy(&self, proxy: &ProxyConfig, url: &str) -> Result<String, DomainError> {
        let html = match proxy.format {
            ProxyFormat::Json => {
                let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
                let envelope: ProxyEnvelope =
                    self.http.get_json(&format!("{}{}", proxy.url, encoded)).await?;
                envelope.contents.unwrap_or_default()
            }
            ProxyFormat::Raw => self.http.get(&format!("{}{}", proxy.url, url)).await?,
        };
        usable_text(&html, MIN_SOURCE_CHARS)
    }
}

/// Readable text of `html` if it has at least `minimum` characters.
fn usable_text(html: &str, minimum: usize) -> Result<String, DomainError> {
    let text = extract_readable_text(html);
    let actual = text.chars().count();
    debug!(chars = actual, minimum, "Extracted page text");
    if actual < minimum {
        return Err(DomainError::InsufficientContent { actual, minimum });
    }
    Ok(text)
}

async fn read_text_file(path: &Path) -> Result<String, DomainError> {
    let file_read = |reason: String| DomainError::FileRead {
        path: path.display().to_string(),
        reason,
    };

    let bytes = tokio::fs::read(path).await.map_err(|e| file_read(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| file_read("not valid UTF-8 text".to_string()))?;
    debug!(path = ?path, bytes = text.len(), "Read source file");
    Ok(text)
}
