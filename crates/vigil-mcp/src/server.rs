use std::path::Path;
use std::sync::{Arc, Mutex};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Deserialize;

use vigil_core::{ExampleMedia, Rule, RuleDocument, RuleLibrary};
use vigil_rulegen::{
    fallback_error_payload, ImagePayload, RuleGenerationRequest, RuleGenerator, SingleFlight,
};

// --- Request types ---

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct GenerateRuleRequest {
    /// Natural-language description of the condition to monitor, e.g. "alert when someone enters the loading dock without a high-vis vest". May be omitted when an image is given.
    pub intent: Option<String>,
    /// Path to a reference image (png, jpg, jpeg, webp, gif, heic, heif) showing a positive example.
    pub image_path: Option<String>,
    /// Reference image as base64. Requires mime_type.
    pub image_base64: Option<String>,
    /// MIME type of image_base64, e.g. "image/png"
    pub mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct DescribeFrameRequest {
    /// Path to a JPEG surveillance frame (.jpg or .jpeg)
    pub image_path: Option<String>,
    /// JPEG frame as base64
    pub image_base64: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SaveRuleRequest {
    /// Standard definition JSON to save. Defaults to the last generated definition.
    pub definition: Option<String>,
    /// Original intent. Defaults to the intent of the last generation when saving the draft.
    pub intent: Option<String>,
    /// Example media reference (URL, path or data URI). Defaults to the image of the last generation when saving the draft.
    pub example: Option<String>,
    /// Kind of the example media: "image" (default) or "video". Only valid with example.
    pub example_kind: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RuleIdRequest {
    /// Rule ID, e.g. "R03"
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ValidateDefinitionRequest {
    /// Standard definition JSON to check
    pub definition: String,
}

// --- Form state ---

/// What the rule form holds between generating and saving.
#[derive(Debug, Clone, Default)]
struct Draft {
    intent: String,
    definition: String,
    media: ExampleMedia,
}

// --- Server ---

#[derive(Clone)]
pub struct VigilServer {
    tool_router: ToolRouter<Self>,
    generator: Arc<RuleGenerator>,
    library: Arc<Mutex<RuleLibrary>>,
    draft: Arc<Mutex<Option<Draft>>>,
    flight: SingleFlight,
}

fn error_result(msg: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.into())]))
}

fn lock_poisoned() -> McpError {
    McpError::internal_error("rule state lock poisoned", None)
}

#[tool_router]
impl VigilServer {
    pub fn new(generator: RuleGenerator, library: RuleLibrary) -> Self {
        Self {
            tool_router: Self::tool_router(),
            generator: Arc::new(generator),
            library: Arc::new(Mutex::new(library)),
            draft: Arc::new(Mutex::new(None)),
            flight: SingleFlight::new(),
        }
    }

    #[tool(
        description = "Convert a natural-language monitoring intent (and/or a reference image) into a standard rule definition JSON using the multimodal model. Returns the definition formatted for review, followed by schema warnings if any. On model or network failure the definition is an {\"error\": ...} payload and the draft is left with nothing to save. Otherwise the result is kept as the current draft for save_rule. Only one generation runs at a time."
    )]
    async fn generate_rule(
        &self,
        Parameters(req): Parameters<GenerateRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let (image, media) = match load_reference_image(&req) {
            Ok(loaded) => loaded,
            Err(e) => return error_result(e),
        };
        let mut request = RuleGenerationRequest::text(req.intent.unwrap_or_default());
        request.image = image;

        if !request.is_issuable() {
            return error_result("Provide an intent, an image, or both.");
        }
        let Some(_guard) = self.flight.try_begin() else {
            return error_result("A rule generation is already in progress. Wait for it to finish.");
        };

        let text = match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "rule generation failed");
                // Nothing saveable came back; keep the input, drop the old definition.
                let mut draft = self.draft.lock().map_err(|_| lock_poisoned())?;
                *draft = Some(Draft {
                    intent: request.intent,
                    definition: String::new(),
                    media,
                });
                return Ok(CallToolResult::success(vec![
                    Content::text(fallback_error_payload()),
                    Content::text(format!("Generation failed: {e}")),
                ]));
            }
        };

        let doc = RuleDocument::parse(&text);
        let display = doc.display_text();
        let mut contents = vec![Content::text(display.clone())];
        match &doc {
            RuleDocument::Raw(_) => contents.push(Content::text(
                "The response is not valid JSON and is shown as plain text. It cannot be saved as a rule; edit it or generate again.",
            )),
            RuleDocument::Structured(_) => {
                let issues = doc.validate();
                if !issues.is_empty() {
                    contents.push(Content::text(format_issues(&issues)));
                }
            }
        }

        let mut draft = self.draft.lock().map_err(|_| lock_poisoned())?;
        *draft = Some(Draft {
            intent: request.intent,
            definition: display,
            media,
        });

        Ok(CallToolResult::success(contents))
    }

    #[tool(
        description = "Briefly describe safety hazards or anomalies in a single JPEG surveillance frame (under 20 words). Returns \"Analysis failed.\" if the model cannot be reached."
    )]
    async fn describe_frame(
        &self,
        Parameters(req): Parameters<DescribeFrameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let frame = match (&req.image_path, &req.image_base64) {
            (Some(path), _) => {
                ImagePayload::from_path(Path::new(path)).and_then(ImagePayload::require_jpeg)
            }
            (None, Some(b64)) => ImagePayload::from_base64(b64, "image/jpeg"),
            (None, None) => return error_result("Provide image_path or image_base64."),
        };
        let frame = match frame {
            Ok(f) => f,
            Err(e) => return error_result(e.to_string()),
        };

        let text = self.generator.describe_frame_or_fallback(&frame.data).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Save a standard definition as a new rule in the library. Without a definition, saves the current draft from generate_rule along with its intent and image. Fails with an invalid-format error if the definition is not a JSON object; the draft is kept so it can be fixed."
    )]
    fn save_rule(
        &self,
        Parameters(req): Parameters<SaveRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut draft_slot = self.draft.lock().map_err(|_| lock_poisoned())?;

        // Intent and media follow the definition: the draft's only when saving the draft.
        let (definition, draft_intent, draft_media) = match req.definition {
            Some(definition) => (definition, String::new(), ExampleMedia::None),
            None => {
                let draft = draft_slot.clone().unwrap_or_default();
                (draft.definition, draft.intent, draft.media)
            }
        };
        if definition.trim().is_empty() {
            return error_result("Nothing to save. Generate a rule first or pass a definition.");
        }
        let intent = req.intent.unwrap_or(draft_intent);
        let media = match (req.example, req.example_kind.as_deref()) {
            (Some(reference), None | Some("image")) => ExampleMedia::Image(reference),
            (Some(reference), Some("video")) => ExampleMedia::Video(reference),
            (Some(_), Some(other)) => {
                return error_result(format!(
                    "Invalid example_kind '{other}'. Use \"image\" or \"video\"."
                ))
            }
            (None, Some(_)) => return error_result("example_kind requires example."),
            (None, None) => draft_media,
        };

        let doc = RuleDocument::parse(&definition);
        let mut library = self.library.lock().map_err(|_| lock_poisoned())?;
        match library.accept(&doc, &intent, &media) {
            Ok(rule) => {
                let text = format!("Saved rule {} \"{}\" ({})", rule.id, rule.name, rule.severity.as_str());
                *draft_slot = None;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                tracing::warn!(error = %e, "rule not saved");
                error_result(e.to_string())
            }
        }
    }

    #[tool(description = "List rules in the library, newest first")]
    fn list_rules(&self) -> Result<CallToolResult, McpError> {
        let library = self.library.lock().map_err(|_| lock_poisoned())?;
        if library.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No rules yet. Use generate_rule and save_rule to create one.",
            )]));
        }
        let lines: Vec<String> = library.list().iter().map(summary_line).collect();
        Ok(CallToolResult::success(vec![Content::text(lines.join("\n"))]))
    }

    #[tool(description = "Get the full record of a rule, including its standard definition")]
    fn get_rule(
        &self,
        Parameters(req): Parameters<RuleIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let library = self.library.lock().map_err(|_| lock_poisoned())?;
        match library.get(&req.id) {
            Some(rule) => {
                let json = serde_json::to_string_pretty(rule)
                    .unwrap_or_else(|e| format!("Serialization error: {}", e));
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            None => error_result(format!("Rule '{}' not found", req.id)),
        }
    }

    #[tool(description = "Delete a rule from the library")]
    fn delete_rule(
        &self,
        Parameters(req): Parameters<RuleIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut library = self.library.lock().map_err(|_| lock_poisoned())?;
        match library.remove(&req.id) {
            Some(rule) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted rule {} \"{}\"",
                rule.id, rule.name
            ))])),
            None => error_result(format!("Rule '{}' not found", req.id)),
        }
    }

    #[tool(description = "Get the standard definition schema used for generated rules, as prompt text and as JSON Schema")]
    fn get_rule_schema(&self) -> Result<CallToolResult, McpError> {
        let json_schema = serde_json::to_string_pretty(&vigil_core::schema::definition_json_schema())
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![
            Content::text(vigil_core::schema::RULE_SCHEMA),
            Content::text(json_schema),
        ]))
    }

    #[tool(description = "Check a standard definition against the schema without saving it. Reports every departure (missing sections, unknown category or severity, empty fields).")]
    fn validate_definition(
        &self,
        Parameters(req): Parameters<ValidateDefinitionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let doc = RuleDocument::parse(&req.definition);
        if doc.structured().is_none() {
            return error_result("Definition is not a JSON object.");
        }
        let issues = doc.validate();
        let text = if issues.is_empty() {
            "Definition matches the standard schema.".to_string()
        } else {
            format_issues(&issues)
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for VigilServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Standard definition schema\n{}",
            INSTRUCTIONS,
            vigil_core::schema::RULE_SCHEMA
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

/// Resolve the reference image of a generation request and the example
/// media reference it leaves on the draft.
fn load_reference_image(
    req: &GenerateRuleRequest,
) -> Result<(Option<ImagePayload>, ExampleMedia), String> {
    if let Some(path) = &req.image_path {
        let image = ImagePayload::from_path(Path::new(path)).map_err(|e| e.to_string())?;
        return Ok((Some(image), ExampleMedia::Image(path.clone())));
    }
    if let Some(b64) = &req.image_base64 {
        let mime = req
            .mime_type
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| "mime_type is required with image_base64".to_string())?;
        let image = ImagePayload::from_base64(b64, mime).map_err(|e| e.to_string())?;
        let media = ExampleMedia::Image(image.to_data_uri());
        return Ok((Some(image), media));
    }
    Ok((None, ExampleMedia::None))
}

fn format_issues(issues: &[vigil_core::SchemaIssue]) -> String {
    let mut out = String::from("Schema warnings:");
    for issue in issues {
        out.push_str("\n- ");
        out.push_str(&issue.to_string());
    }
    out
}

fn summary_line(rule: &Rule) -> String {
    format!(
        "{} | {} | {} | {:?} | {}",
        rule.id,
        rule.name,
        rule.severity.as_str(),
        rule.trigger_type,
        rule.created_at
    )
}

const INSTRUCTIONS: &str = r#"vigil authors monitoring rules for an AIoT video-surveillance platform.

## Workflow
1. `generate_rule` with the user's intent in their own words, plus a reference image if they have one.
2. Show the returned definition to the user. Schema warnings are advisory; the model's output is not guaranteed to follow the schema.
3. If the user wants changes, either call `generate_rule` again or pass an edited definition to `save_rule`.
4. `save_rule` stores the rule in this session's library. Rules are kept in memory only and are lost when the server exits.

## Notes
- Generation is not deterministic. The same intent may produce different definitions.
- A definition that is not a JSON object cannot be saved.
- An `{"error": ...}` definition means the model could not be reached (missing API key or network failure); it is not a rule.
- `describe_frame` gives a one-line hazard summary of a single camera frame."#;
