//! Request/response behaviour of [`RuleGenerator`] against a scripted backend.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;

use vigil_core::{AiSettings, RuleDocument};
use vigil_rulegen::engine::{ContentBackend, GenerateContentRequest, Part};
use vigil_rulegen::{
    GenerationError, ImagePayload, RuleGenerationRequest, RuleGenerator, ANALYSIS_FAILED,
    GENERATION_FAILED, NO_ANOMALIES,
};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    ApiError(u16, &'static str),
    Blocked,
}

/// Returns a fixed reply and records every request it receives.
#[derive(Clone)]
struct ScriptedBackend {
    reply: Reply,
    seen: Arc<Mutex<Vec<GenerateContentRequest>>>,
}

impl ScriptedBackend {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<GenerateContentRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentBackend for ScriptedBackend {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<String, GenerationError> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.reply {
            Reply::Text(t) => Ok(t.to_string()),
            Reply::ApiError(status, msg) => Err(GenerationError::Api {
                status: *status,
                message: msg.to_string(),
            }),
            Reply::Blocked => Err(GenerationError::Blocked("SAFETY".to_string())),
        }
    }
}

fn generator(backend: &ScriptedBackend) -> RuleGenerator {
    RuleGenerator::with_backend(backend.clone(), "gemini-2.5-flash")
}

const FENCED: &str = "```json\n{\"rule_metadata\":{\"name\":\"Unattended Fire\",\"category\":\"safety\",\"severity\":\"critical\"}}\n```";

// ---------------------------------------------------------------------------
// Rule generation
// ---------------------------------------------------------------------------

/// The unattended-fire scenario: one text part carrying the phrase, and a
/// fenced reply comes back with no backticks.
#[tokio::test]
async fn text_intent_sends_one_text_part_and_strips_fences() {
    let backend = ScriptedBackend::new(Reply::Text(FENCED));
    let out = generator(&backend)
        .generate(&RuleGenerationRequest::text("detect unattended fire"))
        .await
        .unwrap();

    assert!(!out.contains('`'));
    assert_eq!(
        out,
        "{\"rule_metadata\":{\"name\":\"Unattended Fire\",\"category\":\"safety\",\"severity\":\"critical\"}}"
    );

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "gemini-2.5-flash");
    assert_eq!(requests[0].parts.len(), 1);
    assert_matches!(&requests[0].parts[0], Part::Text(t) if t.contains("unattended fire"));

    let doc = RuleDocument::parse(&out);
    assert_eq!(doc.structured().unwrap().name(), "Unattended Fire");
}

#[tokio::test]
async fn image_request_sends_image_then_text() {
    let backend = ScriptedBackend::new(Reply::Text("{}"));
    let request = RuleGenerationRequest::text("no helmet")
        .with_image(ImagePayload::new(vec![0xff, 0xd8, 0xff], "image/jpeg"));
    generator(&backend).generate(&request).await.unwrap();

    let parts = &backend.requests()[0].parts;
    assert_eq!(parts.len(), 2);
    assert_matches!(&parts[0], Part::InlineData(d) if d.mime_type == "image/jpeg" && d.data == "/9j/");
    assert_matches!(&parts[1], Part::Text(t) if t.contains("visual_detection") && t.contains("no helmet"));
}

#[tokio::test]
async fn output_never_has_fence_markers_at_the_edges() {
    for reply in ["  ```json\n{}\n```  ", "```\n{\"a\":1}```", "\n{\"a\":1}\n"] {
        let backend = ScriptedBackend::new(Reply::Text(reply));
        let out = generator(&backend)
            .generate(&RuleGenerationRequest::text("watch the gate"))
            .await
            .unwrap();
        assert!(!out.starts_with("```") && !out.ends_with("```"), "{out:?}");
        assert_eq!(out, out.trim());
    }
}

#[tokio::test]
async fn empty_reply_becomes_empty_object() {
    let backend = ScriptedBackend::new(Reply::Text("   "));
    let out = generator(&backend)
        .generate(&RuleGenerationRequest::text("x"))
        .await
        .unwrap();
    assert_eq!(out, "{}");
}

#[tokio::test]
async fn endpoint_failure_is_a_typed_error() {
    let backend = ScriptedBackend::new(Reply::ApiError(503, "overloaded"));
    let err = generator(&backend)
        .generate(&RuleGenerationRequest::text("x"))
        .await
        .unwrap_err();
    assert_matches!(err, GenerationError::Api { status: 503, .. });
}

#[tokio::test]
async fn fallback_turns_failures_into_error_payload() {
    for reply in [Reply::ApiError(500, "boom"), Reply::Blocked] {
        let backend = ScriptedBackend::new(reply);
        let out = generator(&backend)
            .generate_or_fallback(&RuleGenerationRequest::text("x"))
            .await;
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["error"], GENERATION_FAILED);
    }
}

/// Without a credential the real client reports the error payload instead
/// of failing the caller.
#[tokio::test]
async fn missing_credential_yields_error_payload() {
    let generator = RuleGenerator::new(&AiSettings::default());
    assert_matches!(
        generator.generate(&RuleGenerationRequest::text("x")).await,
        Err(GenerationError::MissingApiKey)
    );

    let out = generator
        .generate_or_fallback(&RuleGenerationRequest::text("detect unattended fire"))
        .await;
    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert!(v.get("error").is_some());
}

/// Non-JSON model output survives as raw description text.
#[tokio::test]
async fn non_json_reply_parses_as_raw() {
    let backend = ScriptedBackend::new(Reply::Text("I could not understand the intent."));
    let out = generator(&backend)
        .generate(&RuleGenerationRequest::text("??"))
        .await
        .unwrap();
    let doc = RuleDocument::parse(&out);
    assert_eq!(doc, RuleDocument::Raw("I could not understand the intent.".to_string()));
    assert_eq!(doc.display_text(), out);
}

// ---------------------------------------------------------------------------
// Frame description
// ---------------------------------------------------------------------------

#[tokio::test]
async fn describe_frame_sends_jpeg_and_returns_text() {
    let backend = ScriptedBackend::new(Reply::Text(" Worker on ladder without harness. \n"));
    let out = generator(&backend).describe_frame(&[1, 2, 3]).await.unwrap();
    assert_eq!(out, "Worker on ladder without harness.");

    let parts = &backend.requests()[0].parts;
    assert_eq!(parts.len(), 2);
    assert_matches!(&parts[0], Part::InlineData(d) if d.mime_type == "image/jpeg");
    assert_matches!(&parts[1], Part::Text(t) if t.contains("under 20 words"));
}

#[tokio::test]
async fn describe_frame_defaults_and_fallbacks() {
    let quiet = ScriptedBackend::new(Reply::Text(""));
    assert_eq!(generator(&quiet).describe_frame(&[1]).await.unwrap(), NO_ANOMALIES);

    let broken = ScriptedBackend::new(Reply::ApiError(429, "quota"));
    assert_eq!(
        generator(&broken).describe_frame_or_fallback(&[1]).await,
        ANALYSIS_FAILED
    );
}
