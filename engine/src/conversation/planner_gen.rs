//! Planner Generator
//!
//! Turns a session summary into two or three follow-up activities. The model
//! is asked for `{"tasks": [{"type", "title", "description"}]}` in JSON mode;
//! anything else validates to [`Validated::Invalid`] and yields no tasks.

use sdk::types::TaskDraft;
use serde_json::Value;

use crate::llm::parse::{extract_json_object, non_empty_str};
use crate::llm::Validated;

/// Activity kinds a planner entry may have
pub const TASK_TYPES: [&str; 4] = [
    "journal_prompt",
    "mindfulness_exercise",
    "reflection_question",
    "small_action",
];

/// Upper bound on drafts kept from one reply
pub const MAX_TASKS: usize = 3;

pub fn planner_prompt(summary: &str, onboarding: &str) -> String {
    format!(
        "Based on the following session summary, generate a JSON object with a key \"tasks\" \
         containing an array of 2-3 actionable tasks.\n\
         Use types: 'journal_prompt', 'mindfulness_exercise', 'reflection_question', 'small_action'.\n\
         Each task object needs 'type', 'title', and 'description' keys.\n\
         Tasks must be relevant to the summary and align with CBT principles. Return ONLY the JSON object.\n\
         User background:\n{}\n\
         Session Summary:\n{}",
        onboarding, summary
    )
}

/// Validate a planner reply into task drafts.
///
/// Items missing a field, or with an unknown type, are dropped individually;
/// a reply that is not an object with a `tasks` array is `Invalid`.
pub fn parse_tasks(content: &str) -> Validated<Vec<TaskDraft>> {
    let obj = match extract_json_object(content) {
        Validated::Parsed(obj) => obj,
        Validated::Invalid(reason) => return Validated::Invalid(reason),
    };

    let items = match obj.get("tasks") {
        Some(Value::Array(items)) => items,
        Some(_) => return Validated::Invalid("\"tasks\" is not an array".to_string()),
        None => return Validated::Invalid("missing \"tasks\"".to_string()),
    };

    let drafts: Vec<TaskDraft> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let entry_type = non_empty_str(item, "type")?;
            if !TASK_TYPES.contains(&entry_type) {
                tracing::debug!("Dropping task with unknown type '{}'", entry_type);
                return None;
            }
            Some(TaskDraft {
                entry_type: entry_type.to_string(),
                title: non_empty_str(item, "title")?.to_string(),
                description: non_empty_str(item, "description")?.to_string(),
            })
        })
        .take(MAX_TASKS)
        .collect();

    Validated::Parsed(drafts)
}
