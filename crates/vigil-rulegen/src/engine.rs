//! Transport to the generative-AI endpoint.
//!
//! [`ContentBackend`] is the seam between prompt construction and the wire;
//! [`GeminiClient`] implements it against the Gemini `generateContent` REST
//! API using [`reqwest`].

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use vigil_core::AiSettings;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Inline binary attachment, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One content part of a request message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Part {
        Part::Text(text.into())
    }

    pub fn inline(mime_type: &str, bytes: &[u8]) -> Part {
        Part::InlineData(InlineData {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Part::InlineData(_))
    }
}

/// A single-message request: model identifier plus ordered parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateContentRequest {
    pub model: String,
    pub parts: Vec<Part>,
}

/// Errors from the generation layer.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// No credential was configured for the endpoint.
    #[error("API key not found in settings or environment")]
    MissingApiKey,

    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint returned a non-2xx status code.
    #[error("Gemini API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, or the raw body.
        message: String,
    },

    /// The prompt was rejected by the endpoint's safety filters.
    #[error("prompt blocked: {0}")]
    Blocked(String),
}

#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Submit one request and return the concatenated response text.
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<String, GenerationError>;
}

/// JSON body for `models/{model}:generateContent`.
pub fn request_body(request: &GenerateContentRequest) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": request.parts,
        }]
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, thought summaries excluded.
    /// A prompt blocked before any candidate was produced is an error.
    pub fn into_text(self) -> Result<String, GenerationError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(GenerationError::Blocked(reason));
            }
            return Ok(String::new());
        };

        Ok(candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull the human-readable message out of an API error body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &AiSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, settings: &AiSettings) -> Self {
        Self {
            client,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: settings.api_key.clone(),
        }
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Ensure the response has a success status code, otherwise turn the
    /// body into a [`GenerationError::Api`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ContentBackend for GeminiClient {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<String, GenerationError> {
        if self.api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        response.json::<GenerateContentResponse>().await?.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn response(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parts_serialize_in_wire_shape() {
        let request = GenerateContentRequest {
            model: "gemini-2.5-flash".to_string(),
            parts: vec![Part::inline("image/png", b"\x89PNG"), Part::text("hello")],
        };
        let body = request_body(&request);
        assert_eq!(body["contents"][0]["role"], "user");
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "iVBORw==");
        assert_eq!(parts[1]["text"], "hello");
    }

    #[test]
    fn response_text_joins_parts_and_skips_thoughts() {
        let r = response(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"text":"thinking...","thought":true},
                {"text":"{\"a\":"},
                {"text":"1}"}
            ]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(r.into_text().unwrap(), "{\"a\":1}");
    }

    #[test]
    fn missing_candidates_is_empty_text() {
        assert_eq!(response("{}").into_text().unwrap(), "");
        assert_eq!(
            response(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#)
                .into_text()
                .unwrap(),
            ""
        );
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let r = response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert_matches!(r.into_text(), Err(GenerationError::Blocked(reason)) if reason == "SAFETY");
    }

    #[test]
    fn api_error_message_is_extracted() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "API key not valid.");
        assert_eq!(error_message(" upstream down \n"), "upstream down");
    }

    #[test]
    fn endpoint_uses_configured_base() {
        let settings = AiSettings {
            api_key: "k".to_string(),
            base_url: Some("http://localhost:9000/".to_string()),
            ..AiSettings::default()
        };
        let client = GeminiClient::new(&settings);
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(GeminiClient::new(&AiSettings::default())
            .endpoint("m")
            .starts_with(DEFAULT_BASE_URL));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = GeminiClient::new(&AiSettings::default());
        let request = GenerateContentRequest {
            model: "gemini-2.5-flash".to_string(),
            parts: vec![Part::text("x")],
        };
        assert_matches!(
            client.generate_content(&request).await,
            Err(GenerationError::MissingApiKey)
        );
    }
}
