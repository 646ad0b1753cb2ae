use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::DomainError;

/// HTTP client port for all network requests.
/// All network traffic must go through this interface.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request for a web page and return the body as text.
    async fn get(&self, url: &str) -> Result<String, DomainError>;

    /// Perform a GET request and deserialize the response as JSON.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DomainError>;

    /// Perform a POST request with a JSON body and extra headers.
    ///
    /// Non-2xx responses fail with [`DomainError::Api`], carrying the
    /// structured error message from the body when there is one.
    async fn post_json<T: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<R, DomainError>;

    /// Check if network requests are currently blocked.
    fn is_network_blocked(&self) -> bool;
}
