use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ApiKey, DomainError, GenerationRequest, ModelEndpoint, SamplingConfig};
use crate::ports::{CompletionClient, HttpClient};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl From<&SamplingConfig> for GenerationSettings {
    fn from(sampling: &SamplingConfig) -> Self {
        Self {
            temperature: sampling.temperature,
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            max_output_tokens: sampling.max_output_tokens,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Completion client for the Gemini `generateContent` API.
///
/// The key travels in a request header so it never shows up in URLs or logs.
pub struct GeminiClient<H: HttpClient> {
    http: Arc<H>,
    api_key: ApiKey,
}

impl<H: HttpClient> GeminiClient<H> {
    pub fn new(http: Arc<H>, api_key: ApiKey) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl<H: HttpClient> CompletionClient for GeminiClient<H> {
    async fn complete(
        &self,
        endpoint: &ModelEndpoint,
        request: &GenerationRequest,
        sampling: &SamplingConfig,
    ) -> Result<String, DomainError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: sampling.into(),
        };

        debug!(
            endpoint = %endpoint.name,
            kind = request.kind.id(),
            prompt_chars = request.prompt.chars().count(),
            "Requesting completion"
        );

        let response: GenerateContentResponse = self
            .http
            .post_json(
                &endpoint.url,
                &[(API_KEY_HEADER, self.api_key.expose())],
                &body,
            )
            .await?;

        response
            .into_text()
            .ok_or(DomainError::MissingCompletionText)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http_client::GuardedHttpClient;
    use crate::domain::config::NetworkConfig;
    use crate::domain::{ArtifactKind, SourceDocument, SourceOrigin};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> GeminiClient<GuardedHttpClient> {
        let http = GuardedHttpClient::new(&NetworkConfig::default()).unwrap();
        GeminiClient::new(Arc::new(http), ApiKey::new("test-key"))
    }

    fn request() -> GenerationRequest {
        let doc = SourceDocument::new(
            "Photosynthesis turns light, water and carbon dioxide into sugar and oxygen.",
            SourceOrigin::Pasted,
        )
        .unwrap();
        GenerationRequest::new(ArtifactKind::Notes, &doc)
    }

    #[test]
    fn test_request_body_shape() {
        let sampling = SamplingConfig::default();
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: "hello" }],
            }],
            generation_config: (&sampling).into(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["generationConfig"]["topK"], 40);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 8192);
        assert!(value["generationConfig"]["topP"].is_number());
    }

    #[test]
    fn test_missing_text_paths() {
        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.into_text().is_none());

        let no_parts: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": []}}]})).unwrap();
        assert!(no_parts.into_text().is_none());

        let blocked: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert!(blocked.into_text().is_none());
    }

    #[tokio::test]
    async fn test_complete_returns_first_part_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(json!({"generationConfig": {"topK": 40}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "<h2>Notes</h2>"}, {"text": "ignored"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = ModelEndpoint::gemini(&server.uri(), "gemini-2.5-flash");
        assert!(!endpoint.url.contains("test-key"));

        let text = client()
            .complete(&endpoint, &request(), &SamplingConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "<h2>Notes</h2>");
    }

    #[tokio::test]
    async fn test_complete_empty_candidates_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let endpoint = ModelEndpoint::gemini(&server.uri(), "gemini-2.0-flash");
        let err = client()
            .complete(&endpoint, &request(), &SamplingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::MissingCompletionText));
    }

    #[tokio::test]
    async fn test_complete_http_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": {"message": "The model is overloaded"}
            })))
            .mount(&server)
            .await;

        let endpoint = ModelEndpoint::gemini(&server.uri(), "gemini-2.5-pro");
        let err = client()
            .complete(&endpoint, &request(), &SamplingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Api { status: 503, .. }));
        assert!(err.to_string().contains("overloaded"));
    }
}
