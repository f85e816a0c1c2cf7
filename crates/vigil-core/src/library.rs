//! In-memory rule library. Rules live for the lifetime of the process only.

use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::document::{AcceptError, ExampleMedia, RuleDocument};
use crate::{next_rule_id, Rule, Severity, TriggerType};

/// Rules ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct RuleLibrary {
    rules: Vec<Rule>,
}

impl RuleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding the stock example rules.
    pub fn seeded() -> Self {
        Self {
            rules: seed_rules(),
        }
    }

    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn next_id(&self) -> String {
        next_rule_id(&self.rules)
    }

    /// Insert at the front of the list.
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(0, rule);
    }

    pub fn remove(&mut self, id: &str) -> Option<Rule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        let removed = self.rules.remove(pos);
        tracing::debug!(id, "rule removed");
        Some(removed)
    }

    /// Accept a generated document as a new rule dated today.
    /// On failure the library is left untouched.
    pub fn accept(
        &mut self,
        doc: &RuleDocument,
        intent: &str,
        media: &ExampleMedia,
    ) -> Result<&Rule, AcceptError> {
        self.accept_on(doc, intent, media, Utc::now().date_naive())
    }

    pub fn accept_on(
        &mut self,
        doc: &RuleDocument,
        intent: &str,
        media: &ExampleMedia,
        created_at: NaiveDate,
    ) -> Result<&Rule, AcceptError> {
        let rule = doc.to_rule(self.next_id(), intent, media, created_at)?;
        tracing::info!(id = %rule.id, name = %rule.name, "rule accepted");
        self.insert(rule);
        Ok(&self.rules[0])
    }
}

fn definition_text(value: serde_json::Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_default()
}

fn seed_rules() -> Vec<Rule> {
    let date = |d: u32| NaiveDate::from_ymd_opt(2025, 11, d).unwrap_or_default();

    vec![
        Rule {
            id: "R01".to_string(),
            name: "Safety Helmet Detection".to_string(),
            description: "Check for hard hat presence on all personnel.".to_string(),
            original_intent: Some(
                "Check whether everyone entering the construction area wears a safety helmet; raise an alarm immediately if not."
                    .to_string(),
            ),
            standard_definition: Some(definition_text(json!({
                "rule_metadata": { "name": "Safety Helmet Detection", "category": "safety", "severity": "high" },
                "visual_detection": { "target_objects": ["person"], "required_attributes": ["wearing helmet"], "negative_constraints": ["none"] },
                "trigger_logic": { "condition_description": "IF Person detected AND NOT wearing Helmet THEN trigger", "temporal_threshold_seconds": 1 },
                "response_action": { "alert_message": "Warning: Personnel detected without safety helmet", "suggested_actions": ["Broadcast Warning"] }
            }))),
            severity: Severity::High,
            trigger_type: TriggerType::Image,
            examples: vec!["https://picsum.photos/400/300?random=20".to_string()],
            created_at: date(10),
        },
        Rule {
            id: "R02".to_string(),
            name: "Restricted Zone Intrusion".to_string(),
            description: "Identify any human figures detected within the marked red zone.".to_string(),
            original_intent: Some(
                "Watch the red restricted zone for intruders, telling people apart from animals. People are the main target."
                    .to_string(),
            ),
            standard_definition: Some(definition_text(json!({
                "rule_metadata": { "name": "Restricted Zone Intrusion", "category": "security", "severity": "critical" },
                "visual_detection": { "target_objects": ["person"], "required_attributes": ["inside restricted zone"], "negative_constraints": ["animal", "machinery"] },
                "trigger_logic": { "condition_description": "IF Person detected inside Zone A THEN trigger", "temporal_threshold_seconds": 0 },
                "response_action": { "alert_message": "Critical: Unauthorized person in restricted zone", "suggested_actions": ["Notify Security", "Lockdown"] }
            }))),
            severity: Severity::Critical,
            trigger_type: TriggerType::Video,
            examples: vec![
                "https://storage.googleapis.com/gtv-videos-bucket/sample/ForBiggerBlazes.mp4".to_string(),
            ],
            created_at: date(12),
        },
        Rule {
            id: "R03".to_string(),
            name: "Fire and Smoke Detection".to_string(),
            description: "Detect visual signatures of fire or smoke plumes.".to_string(),
            original_intent: Some(
                "Recognize any visible open flame or heavy smoke to prevent fires.".to_string(),
            ),
            standard_definition: Some(definition_text(json!({
                "rule_metadata": { "name": "Fire and Smoke Detection", "category": "safety", "severity": "critical" },
                "visual_detection": { "target_objects": ["fire", "smoke"], "required_attributes": ["orange flickering light", "grey/white cloud"], "negative_constraints": ["none"] },
                "trigger_logic": { "condition_description": "IF Fire OR Smoke detected THEN trigger", "temporal_threshold_seconds": 3 },
                "response_action": { "alert_message": "Emergency: Fire detected", "suggested_actions": ["Trigger Fire Alarm", "Call 119"] }
            }))),
            severity: Severity::Critical,
            trigger_type: TriggerType::Image,
            examples: vec!["https://picsum.photos/400/300?random=21".to_string()],
            created_at: date(15),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn seeded_library_has_stock_rules() {
        let lib = RuleLibrary::seeded();
        assert_eq!(lib.len(), 3);
        assert_eq!(lib.next_id(), "R04");
        let fire = lib.get("R03").expect("fire rule");
        assert_eq!(fire.severity, Severity::Critical);
        let doc = RuleDocument::parse(fire.standard_definition.as_deref().unwrap());
        assert!(doc.validate().is_empty());
    }

    #[test]
    fn accept_prepends_and_assigns_next_id() {
        let mut lib = RuleLibrary::seeded();
        let doc = RuleDocument::parse(r#"{"rule_metadata":{"name":"Forklift Speeding","severity":"warning"}}"#);
        let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();

        let rule = lib
            .accept_on(&doc, "forklifts faster than walking pace", &ExampleMedia::None, day)
            .unwrap();
        assert_eq!(rule.id, "R04");
        assert_eq!(rule.created_at, day);

        assert_eq!(lib.len(), 4);
        assert_eq!(lib.list()[0].name, "Forklift Speeding");
        assert_eq!(lib.next_id(), "R05");
    }

    #[test]
    fn failed_accept_leaves_library_unchanged() {
        let mut lib = RuleLibrary::seeded();
        let doc = RuleDocument::parse("The model rambled instead of answering.");
        assert_matches!(
            lib.accept(&doc, "x", &ExampleMedia::None),
            Err(AcceptError::InvalidFormat)
        );
        assert_eq!(lib.len(), 3);
        assert_eq!(lib.list()[0].id, "R01");
    }

    #[test]
    fn remove_by_id() {
        let mut lib = RuleLibrary::seeded();
        let removed = lib.remove("R02").expect("present");
        assert_eq!(removed.name, "Restricted Zone Intrusion");
        assert!(lib.get("R02").is_none());
        assert!(lib.remove("R02").is_none());
        assert_eq!(lib.len(), 2);
    }

    #[test]
    fn empty_library() {
        let lib = RuleLibrary::new();
        assert!(lib.is_empty());
        assert_eq!(lib.next_id(), "R01");
    }
}
