//! Profile Aggregator
//!
//! Asks the model to fold one session into the user's cumulative profile.
//! Synthesis (rather than appending) and the 3-5 insight target are prompt
//! policy only; validation checks shape, not content.

use sdk::types::{KeyInsight, ProfileUpdate};
use serde_json::Value;

use super::prompt::render_transcript;
use crate::db::{TranscriptChunk, User};
use crate::llm::parse::{extract_json_object, non_empty_str};
use crate::llm::Validated;

pub fn profile_prompt(user: &User, transcript: &[TranscriptChunk]) -> String {
    let previous_summary = user
        .long_term_profile_summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("N/A");
    let previous_insights = user
        .key_insights
        .as_ref()
        .and_then(|i| serde_json::to_string(i).ok())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "As a clinical psychologist, analyze the following therapy session transcript for a user \
         with Gifted Kid Syndrome.\n\
         Previous long-term summary: \"{}\"\n\
         Previous key insights: {}\n\
         Transcript (oldest first):\n{}\n\
         Instructions:\n\
         1. Refine the \"longTermProfileSummary\" by integrating new learnings from this session. \
         It must be a CUMULATIVE synthesis, not an append.\n\
         2. Refine the \"keyInsights\" array. Update existing insights or add new ones discovered \
         in this session. Aim for 3-5 core insights.\n\
         3. Return ONLY the following JSON object.\n\
         {{\n  \"longTermProfileSummary\": \"A dense, clinical paragraph summarizing the user's core \
         struggles, cognitive patterns, emotional state, and progress.\",\n  \
         \"keyInsights\": [\n    {{ \"belief\": \"A core belief...\", \"trigger\": \"A corresponding trigger...\" }}\n  ]\n}}",
        previous_summary,
        previous_insights,
        render_transcript(transcript, "\n\n")
    )
}

/// Validate a profile reply.
///
/// The summary must be a non-empty string and `keyInsights` an array whose
/// every item has a non-empty `belief` and `trigger`. One bad insight rejects
/// the whole reply so a partial profile is never written.
pub fn parse_profile(content: &str) -> Validated<ProfileUpdate> {
    let obj = match extract_json_object(content) {
        Validated::Parsed(obj) => obj,
        Validated::Invalid(reason) => return Validated::Invalid(reason),
    };

    let Some(summary) = non_empty_str(&obj, "longTermProfileSummary") else {
        return Validated::Invalid("missing longTermProfileSummary".to_string());
    };

    let Some(Value::Array(items)) = obj.get("keyInsights") else {
        return Validated::Invalid("keyInsights is not an array".to_string());
    };

    let mut insights = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let parsed = item.as_object().and_then(|o| {
            Some(KeyInsight {
                belief: non_empty_str(o, "belief")?.to_string(),
                trigger: non_empty_str(o, "trigger")?.to_string(),
            })
        });
        match parsed {
            Some(insight) => insights.push(insight),
            None => return Validated::Invalid(format!("keyInsights[{}] lacks belief or trigger", i)),
        }
    }

    Validated::Parsed(ProfileUpdate {
        long_term_profile_summary: summary.to_string(),
        key_insights: insights,
    })
}
