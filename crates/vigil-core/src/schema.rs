/// Standard definition schema: single source of truth for generation prompts and MCP instructions.
pub const RULE_SCHEMA: &str = r#"{
  "rule_metadata": {
    "name": "Short descriptive name (e.g., 'Safety Helmet Detection')",
    "category": "safety" | "security" | "process_quality",
    "severity": "info" | "warning" | "critical"
  },
  "visual_detection": {
    "target_objects": ["List of primary objects to detect, e.g., 'person', 'helmet'"],
    "required_attributes": ["Specific visual attributes, e.g., 'wearing yellow helmet'"],
    "negative_constraints": ["Objects that should NOT be present, or 'none'"]
  },
  "trigger_logic": {
    "condition_description": "Formal logic description (e.g., 'IF Person detected AND NOT wearing Helmet THEN trigger')",
    "temporal_threshold_seconds": 0
  },
  "response_action": {
    "alert_message": "Human readable alert message",
    "suggested_actions": ["Notify Supervisor", "Broadcast Warning"]
  }
}"#;

/// Category values the prompt allows in `rule_metadata.category`.
pub const CATEGORIES: &[&str] = &["safety", "security", "process_quality"];

/// Severity values the prompt allows in `rule_metadata.severity`.
/// The seeded library rules also use the rule scale (`low`..`critical`),
/// so those are accepted too.
pub const SEVERITIES: &[&str] = &["info", "warning", "critical", "low", "medium", "high"];

/// JSON Schema of [`crate::RuleDefinition`], as served to MCP clients.
pub fn definition_json_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(crate::RuleDefinition);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
