use vigil_core::schema::RULE_SCHEMA;

use crate::engine::Part;
use crate::RuleGenerationRequest;

const IMAGE_PREFIX: &str = "Analyze this image as a positive example for the rule. \
Extract visual features from it to populate the 'visual_detection' fields.";

pub const FRAME_PROMPT: &str = "Identify any safety hazards or anomalies in this surveillance frame. \
Keep it brief (under 20 words).";

pub const FRAME_MIME_TYPE: &str = "image/jpeg";

pub fn rule_prompt(intent: &str) -> String {
    format!(
        "You are an expert in AIoT (Artificial Intelligence of Things) and security monitoring.\n\
The user wants to define a new regulation rule for an automated monitoring system.\n\n\
User Intent: \"{intent}\"\n\n\
Please analyze the intent (and the provided image reference if any) and convert it into \
a Standardized Formal Language Expression in JSON format.\n\n\
The JSON must strictly follow this schema:\n{RULE_SCHEMA}\n\n\
Output ONLY the raw JSON string. Do not include markdown formatting (like ```json)."
    )
}

/// Rule prompt variant used when a reference image is attached.
pub fn image_rule_prompt(intent: &str) -> String {
    format!("{IMAGE_PREFIX} {}", rule_prompt(intent))
}

/// Ordered parts for a rule request: `[image, text]` with a usable image,
/// `[text]` otherwise.
pub fn rule_parts(request: &RuleGenerationRequest) -> Vec<Part> {
    match request.image.as_ref().filter(|img| img.is_usable()) {
        Some(img) => vec![
            Part::inline(&img.mime_type, &img.data),
            Part::text(image_rule_prompt(&request.intent)),
        ],
        None => vec![Part::text(rule_prompt(&request.intent))],
    }
}

pub fn frame_parts(jpeg: &[u8]) -> Vec<Part> {
    vec![Part::inline(FRAME_MIME_TYPE, jpeg), Part::text(FRAME_PROMPT)]
}
