pub mod document;
pub mod library;
pub mod schema;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use document::{AcceptError, ExampleMedia, RuleDocument, SchemaIssue, StructuredRule};
pub use library::RuleLibrary;

/// Model used when neither the settings file nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

// --- Rules ---

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a severity label onto the rule scale. Accepts both the rule scale
    /// and the `info | warning | critical` scale of the standard definition.
    pub fn from_label(label: &str) -> Option<Severity> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Some(Severity::Low),
            "medium" | "warning" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Text,
    Image,
    Video,
}

/// A rule accepted into the library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    /// The user's natural-language input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_intent: Option<String>,
    /// Standard definition JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_definition: Option<String>,
    pub severity: Severity,
    pub trigger_type: TriggerType,
    /// References to example media (URLs or data URIs)
    #[serde(default)]
    pub examples: Vec<String>,
    pub created_at: NaiveDate,
}

// --- Standard definition ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(default)]
pub struct RuleMetadata {
    /// Short descriptive name, e.g. "Safety Helmet Detection"
    pub name: String,
    /// One of "safety", "security", "process_quality"
    pub category: String,
    /// One of "info", "warning", "critical"
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(default)]
pub struct VisualDetection {
    /// Primary objects to detect, e.g. "person", "helmet"
    pub target_objects: Vec<String>,
    /// Visual attributes, e.g. "wearing yellow helmet"
    pub required_attributes: Vec<String>,
    /// Objects that should not be present, or "none"
    pub negative_constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(default)]
pub struct TriggerLogic {
    /// e.g. "IF Person detected AND NOT wearing Helmet THEN trigger"
    pub condition_description: String,
    pub temporal_threshold_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(default)]
pub struct ResponseAction {
    pub alert_message: String,
    pub suggested_actions: Vec<String>,
}

/// The fixed-schema standard definition produced from an intent.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(default)]
pub struct RuleDefinition {
    pub rule_metadata: RuleMetadata,
    pub visual_detection: VisualDetection,
    pub trigger_logic: TriggerLogic,
    pub response_action: ResponseAction,
}

/// Generate the next rule ID by scanning existing rules.
/// Follows the library pattern: "R{NN}" with NN incrementing.
pub fn next_rule_id(rules: &[Rule]) -> String {
    let max = rules
        .iter()
        .filter_map(|r| r.id.strip_prefix('R').and_then(|s| s.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    format!("R{:02}", max + 1)
}

// --- AI Settings ---

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub api_key: String,
    pub model: String,
    /// Override for the generative-AI endpoint root, e.g. a proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
        }
    }
}

impl AiSettings {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    ///
    /// `GEMINI_API_KEY` wins over `API_KEY`; `VIGIL_MODEL` and
    /// `VIGIL_API_BASE` replace the model and endpoint root.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")) {
            self.api_key = key;
        }
        if let Some(model) = non_empty("VIGIL_MODEL") {
            self.model = model;
        }
        if let Some(base) = non_empty("VIGIL_API_BASE") {
            self.base_url = Some(base);
        }
        self
    }
}

/// Resolve the global settings directory (~/.vigil/).
pub fn vigil_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vigil")
}

fn settings_path() -> PathBuf {
    vigil_dir().join("settings.json")
}

/// Read settings from a file. A missing or unreadable file yields defaults.
pub fn read_settings_from(path: &Path) -> AiSettings {
    if !path.exists() {
        return AiSettings::default();
    }
    match fs::read_to_string(path)
        .map_err(SettingsError::from)
        .and_then(|s| serde_json::from_str(&s).map_err(SettingsError::from))
    {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            AiSettings::default()
        }
    }
}

pub fn write_settings_to(path: &Path, settings: &AiSettings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_settings() -> AiSettings {
    read_settings_from(&settings_path())
}

pub fn write_settings(settings: &AiSettings) -> Result<(), SettingsError> {
    write_settings_to(&settings_path(), settings)
}

/// Settings file merged with process environment overrides.
pub fn load_settings() -> AiSettings {
    read_settings().with_overrides(|key| std::env::var(key).ok())
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.api_key.trim().is_empty() && !settings.model.trim().is_empty()
}
