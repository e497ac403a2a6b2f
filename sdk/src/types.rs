//! Shared wire types
//!
//! These shapes cross process boundaries: they are stored as JSON columns,
//! exchanged with the LLM in JSON mode, and returned over the HTTP API.

use serde::{Deserialize, Serialize};

/// One answered onboarding question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnboardingResponse {
    pub question: String,
    pub answer: String,
}

impl OnboardingResponse {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A core belief paired with the situation that triggers it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyInsight {
    pub belief: String,
    pub trigger: String,
}

/// User-level preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    /// Voice model used when synthesizing replies for this user
    #[serde(default, rename = "ttsVoice", skip_serializing_if = "Option::is_none")]
    pub tts_voice: Option<String>,
}

/// Planner task suggested by the LLM
///
/// Wire format: `{"type": "...", "title": "...", "description": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub title: String,
    pub description: String,
}

/// Profile refresh returned by the aggregation call
///
/// Wire format: `{"longTermProfileSummary": "...", "keyInsights": [{"belief", "trigger"}]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub long_term_profile_summary: String,
    pub key_insights: Vec<KeyInsight>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_draft_uses_type_key() {
        let draft = TaskDraft {
            entry_type: "journal_prompt".to_string(),
            title: "Write".to_string(),
            description: "Five minutes".to_string(),
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["type"], "journal_prompt");
        assert!(json.get("entry_type").is_none());
    }

    #[test]
    fn test_profile_update_camel_case() {
        let raw = r#"{"longTermProfileSummary":"s","keyInsights":[{"belief":"b","trigger":"t"}]}"#;
        let update: ProfileUpdate = serde_json::from_str(raw).unwrap();
        assert_eq!(update.long_term_profile_summary, "s");
        assert_eq!(update.key_insights.len(), 1);
    }

    #[test]
    fn test_preferences_skip_empty_voice() {
        let json = serde_json::to_string(&Preferences::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
