//! Parse-or-fallback handling of generated standard definitions.
//!
//! Generated text is decided once: a JSON object becomes
//! [`RuleDocument::Structured`], anything else stays [`RuleDocument::Raw`]
//! and is shown as plain description text.

use chrono::NaiveDate;
use serde_json::Value;

use crate::schema::{CATEGORIES, SEVERITIES};
use crate::{Rule, RuleDefinition, Severity, TriggerType};

const DEFAULT_RULE_NAME: &str = "New Generated Rule";
const DEFAULT_DESCRIPTION: &str = "No description";

/// A generated definition that parsed as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRule {
    value: Value,
    definition: Result<RuleDefinition, String>,
}

impl StructuredRule {
    /// The JSON exactly as generated, unknown fields included.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The typed definition, if the object's field types match the schema.
    pub fn definition(&self) -> Option<&RuleDefinition> {
        self.definition.as_ref().ok()
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.value
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> &str {
        self.str_at("/rule_metadata/name").unwrap_or(DEFAULT_RULE_NAME)
    }

    pub fn severity(&self) -> Severity {
        self.str_at("/rule_metadata/severity")
            .and_then(Severity::from_label)
            .unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.str_at("/rule_metadata/description")
            .or_else(|| self.str_at("/trigger_logic/condition_description"))
            .unwrap_or(DEFAULT_DESCRIPTION)
    }

    /// Advisory schema check. An empty list means the definition matches.
    pub fn validate(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();

        for section in ["rule_metadata", "visual_detection", "trigger_logic", "response_action"] {
            if self.value.get(section).is_none() {
                issues.push(SchemaIssue::MissingSection(section));
            }
        }

        let def = match &self.definition {
            Ok(def) => def,
            Err(e) => {
                issues.push(SchemaIssue::Mismatch(e.clone()));
                return issues;
            }
        };

        let meta = &def.rule_metadata;
        if meta.name.trim().is_empty() {
            issues.push(SchemaIssue::MissingName);
        }
        if !CATEGORIES.contains(&meta.category.as_str()) {
            issues.push(SchemaIssue::UnknownCategory(meta.category.clone()));
        }
        if !SEVERITIES.contains(&meta.severity.as_str()) {
            issues.push(SchemaIssue::UnknownSeverity(meta.severity.clone()));
        }
        if def.visual_detection.target_objects.is_empty() {
            issues.push(SchemaIssue::NoTargetObjects);
        }
        if def.trigger_logic.condition_description.trim().is_empty() {
            issues.push(SchemaIssue::MissingCondition);
        }
        if def.trigger_logic.temporal_threshold_seconds < 0.0 {
            issues.push(SchemaIssue::NegativeThreshold(
                def.trigger_logic.temporal_threshold_seconds,
            ));
        }
        if def.response_action.alert_message.trim().is_empty() {
            issues.push(SchemaIssue::MissingAlertMessage);
        }

        issues
    }
}

/// Ways a structured definition departs from the standard schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaIssue {
    #[error("missing section `{0}`")]
    MissingSection(&'static str),

    #[error("field types do not match the schema: {0}")]
    Mismatch(String),

    #[error("rule_metadata.name is empty")]
    MissingName,

    #[error("unknown category `{0}`")]
    UnknownCategory(String),

    #[error("unknown severity `{0}`")]
    UnknownSeverity(String),

    #[error("visual_detection.target_objects is empty")]
    NoTargetObjects,

    #[error("trigger_logic.condition_description is empty")]
    MissingCondition,

    #[error("trigger_logic.temporal_threshold_seconds is negative ({0})")]
    NegativeThreshold(f64),

    #[error("response_action.alert_message is empty")]
    MissingAlertMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcceptError {
    /// The generated text is not a JSON object, so no rule fields can be read.
    #[error("cannot save: the generated rule has an invalid format")]
    InvalidFormat,

    #[error("nothing to save: the generated rule is empty")]
    Empty,
}

/// Example media attached to the rule form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExampleMedia {
    #[default]
    None,
    /// Reference to an example image (URL or data URI)
    Image(String),
    /// Reference to an example video
    Video(String),
}

impl ExampleMedia {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            ExampleMedia::None => TriggerType::Text,
            ExampleMedia::Image(_) => TriggerType::Image,
            ExampleMedia::Video(_) => TriggerType::Video,
        }
    }

    fn references(&self) -> Vec<String> {
        match self {
            ExampleMedia::None => vec![],
            ExampleMedia::Image(r) | ExampleMedia::Video(r) => vec![r.clone()],
        }
    }
}

/// A generation result after the single parse decision.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    Structured(StructuredRule),
    Raw(String),
}

impl RuleDocument {
    pub fn parse(text: &str) -> RuleDocument {
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => {
                let definition =
                    serde_json::from_value::<RuleDefinition>(value.clone()).map_err(|e| e.to_string());
                RuleDocument::Structured(StructuredRule { value, definition })
            }
            _ => RuleDocument::Raw(text.to_string()),
        }
    }

    pub fn structured(&self) -> Option<&StructuredRule> {
        match self {
            RuleDocument::Structured(s) => Some(s),
            RuleDocument::Raw(_) => None,
        }
    }

    /// Text for display and editing: pretty JSON with two-space indent,
    /// or the raw text unchanged.
    pub fn display_text(&self) -> String {
        match self {
            RuleDocument::Structured(s) => {
                serde_json::to_string_pretty(&s.value).unwrap_or_else(|_| s.value.to_string())
            }
            RuleDocument::Raw(text) => text.clone(),
        }
    }

    /// Schema issues of a structured document. Raw documents report none;
    /// they fail earlier, at [`RuleDocument::to_rule`].
    pub fn validate(&self) -> Vec<SchemaIssue> {
        self.structured().map(StructuredRule::validate).unwrap_or_default()
    }

    /// Build the library record for an accepted document.
    pub fn to_rule(
        &self,
        id: String,
        intent: &str,
        media: &ExampleMedia,
        created_at: NaiveDate,
    ) -> Result<Rule, AcceptError> {
        let structured = match self {
            RuleDocument::Structured(s) => s,
            RuleDocument::Raw(text) if text.trim().is_empty() => return Err(AcceptError::Empty),
            RuleDocument::Raw(_) => return Err(AcceptError::InvalidFormat),
        };

        let intent = intent.trim();
        Ok(Rule {
            id,
            name: structured.name().to_string(),
            description: structured.description().to_string(),
            original_intent: (!intent.is_empty()).then(|| intent.to_string()),
            standard_definition: Some(self.display_text()),
            severity: structured.severity(),
            trigger_type: media.trigger_type(),
            examples: media.references(),
            created_at,
        })
    }
}
