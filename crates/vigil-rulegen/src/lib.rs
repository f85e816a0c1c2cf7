//! Rule generation client.
//!
//! Turns a natural-language monitoring intent, optionally with a reference
//! image, into a standard rule definition by calling a multimodal model.
//! Output is cleaned of markdown fences but otherwise returned verbatim;
//! callers decide structure with [`vigil_core::RuleDocument::parse`].

pub mod engine;
mod flight;
mod parse;
pub mod prompt;

use std::path::Path;

use base64::Engine as _;

use engine::{ContentBackend, GeminiClient, GenerateContentRequest};

pub use engine::GenerationError;
pub use flight::{FlightGuard, SingleFlight};
pub use parse::strip_code_fences;

/// Message carried by [`fallback_error_payload`].
pub const GENERATION_FAILED: &str = "Failed to generate rule. Please check API key or network.";

/// Frame description returned when analysis fails.
pub const ANALYSIS_FAILED: &str = "Analysis failed.";

/// Frame description used when the model answers with no text.
pub const NO_ANOMALIES: &str = "No anomalies detected.";

/// Binary image plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported image type `{0}` (expected png, jpg, jpeg, webp, gif, heic or heif)")]
    UnsupportedType(String),

    #[error("image data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("frames must be JPEG, got `{0}`")]
    NotJpeg(String),
}

/// MIME type for an image file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

impl ImagePayload {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Load an image file, taking the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, ImageError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime = mime_for_extension(&ext).ok_or(ImageError::UnsupportedType(ext))?;
        Ok(Self::new(std::fs::read(path)?, mime))
    }

    pub fn from_base64(encoded: &str, mime_type: impl Into<String>) -> Result<Self, ImageError> {
        let data = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        Ok(Self::new(data, mime_type))
    }

    /// Keep the payload only if it is a JPEG frame.
    pub fn require_jpeg(self) -> Result<Self, ImageError> {
        if self.mime_type == prompt::FRAME_MIME_TYPE {
            Ok(self)
        } else {
            Err(ImageError::NotJpeg(self.mime_type))
        }
    }

    /// Both the bytes and the MIME type are present.
    pub fn is_usable(&self) -> bool {
        !self.data.is_empty() && !self.mime_type.trim().is_empty()
    }

    /// `data:` URI, used as an example media reference.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// Intent text with an optional reference image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleGenerationRequest {
    pub intent: String,
    pub image: Option<ImagePayload>,
}

impl RuleGenerationRequest {
    pub fn text(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    /// At least one of intent text or image is present. The generator does
    /// not check this; surfaces should before issuing a request.
    pub fn is_issuable(&self) -> bool {
        !self.intent.trim().is_empty() || self.image.as_ref().is_some_and(ImagePayload::is_usable)
    }
}

/// Pretty-printed `{"error": ...}` payload shown in place of a definition.
pub fn fallback_error_payload() -> String {
    let payload = serde_json::json!({ "error": GENERATION_FAILED });
    serde_json::to_string_pretty(&payload)
        .unwrap_or_else(|_| format!("{{\"error\": \"{GENERATION_FAILED}\"}}"))
}

pub struct RuleGenerator {
    backend: Box<dyn ContentBackend>,
    model: String,
}

impl RuleGenerator {
    /// Generator backed by the Gemini REST API.
    pub fn new(settings: &vigil_core::AiSettings) -> Self {
        Self::with_backend(GeminiClient::new(settings), settings.model.clone())
    }

    pub fn with_backend(backend: impl ContentBackend + 'static, model: impl Into<String>) -> Self {
        Self {
            backend: Box::new(backend),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a standard definition. Output is not deterministic: identical
    /// requests may produce different text.
    pub async fn generate(&self, request: &RuleGenerationRequest) -> Result<String, GenerationError> {
        let parts = prompt::rule_parts(request);
        let with_image = parts.iter().any(|p| p.is_inline());
        tracing::info!(model = %self.model, parts = parts.len(), with_image, "requesting rule definition");

        let raw = self
            .backend
            .generate_content(&GenerateContentRequest {
                model: self.model.clone(),
                parts,
            })
            .await?;

        tracing::debug!(raw = %raw, "raw model output");
        if raw.trim().is_empty() {
            return Ok("{}".to_string());
        }
        Ok(strip_code_fences(&raw))
    }

    /// [`RuleGenerator::generate`] with every failure folded into
    /// [`fallback_error_payload`].
    pub async fn generate_or_fallback(&self, request: &RuleGenerationRequest) -> String {
        match self.generate(request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "rule generation failed");
                fallback_error_payload()
            }
        }
    }

    /// Short hazard/anomaly description of a single JPEG frame.
    pub async fn describe_frame(&self, jpeg: &[u8]) -> Result<String, GenerationError> {
        tracing::info!(model = %self.model, bytes = jpeg.len(), "requesting frame description");
        let text = self
            .backend
            .generate_content(&GenerateContentRequest {
                model: self.model.clone(),
                parts: prompt::frame_parts(jpeg),
            })
            .await?;

        let text = text.trim();
        if text.is_empty() {
            Ok(NO_ANOMALIES.to_string())
        } else {
            Ok(text.to_string())
        }
    }

    pub async fn describe_frame_or_fallback(&self, jpeg: &[u8]) -> String {
        match self.describe_frame(jpeg).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "frame analysis failed");
                ANALYSIS_FAILED.to_string()
            }
        }
    }
}
