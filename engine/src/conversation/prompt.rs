//! Prompt assembly
//!
//! Rendering is pure: every function here takes already-loaded records and
//! returns text, so the exact prompt a turn would send is unit-testable.

use crate::db::{PlannerEntry, PlannerStatus, Role, TranscriptChunk, User};
use crate::llm::Message;

/// Dr. K persona and response framework
pub const PERSONA: &str = include_str!("../../prompts/persona.md");

pub const NO_ONBOARDING: &str = "No onboarding data available.";
pub const NO_ACTIVE_TASKS: &str = "The user has no active tasks in their planner.";

/// Onboarding answers as a Q/A list, or a placeholder when onboarding is incomplete
pub fn render_onboarding(user: &User) -> String {
    match (&user.onboarding_responses, user.onboarding_completed) {
        (Some(responses), true) if !responses.is_empty() => {
            let lines: Vec<String> = responses
                .iter()
                .map(|r| format!("- Q: {}\n  A: {}", r.question, r.answer))
                .collect();
            format!("From onboarding, the user answered:\n{}", lines.join("\n"))
        }
        _ => NO_ONBOARDING.to_string(),
    }
}

/// Pending and in-progress planner entries, or a placeholder
pub fn render_planner(entries: &[PlannerEntry]) -> String {
    let lines: Vec<String> = entries
        .iter()
        .filter(|e| matches!(e.status, PlannerStatus::Pending | PlannerStatus::InProgress))
        .map(|e| format!("- {} ({})", e.title, e.status.as_str()))
        .collect();

    if lines.is_empty() {
        NO_ACTIVE_TASKS.to_string()
    } else {
        format!("The user is working on:\n{}", lines.join("\n"))
    }
}

/// The single system message that opens every conversational turn
pub fn system_prompt(methodology: Option<&str>, onboarding: &str, planner: &str) -> String {
    let mut prompt = String::from("--- START: CONTEXT FOR AI (FOR YOUR EYES ONLY) ---\n\n");

    if let Some(doc) = methodology {
        prompt.push_str(
            "**Core Methodology Document:**\n\
             You must base your therapeutic methodology on the principles outlined in this document.\n\
             <MethodologyDocument>\n",
        );
        prompt.push_str(doc.trim());
        prompt.push_str("\n</MethodologyDocument>\n\n");
    }

    prompt.push_str(&format!(
        "**User's Onboarding Information:**\n\
         This is what the user told you about themselves when they first signed up.\n\
         <Onboarding>\n{}\n</Onboarding>\n\n\
         **User's Current Planner Tasks:**\n\
         This is what the user is currently working on.\n\
         <Planner>\n{}\n</Planner>\n\n\
         --- END: CONTEXT FOR AI ---\n\n\
         --- START: YOUR CORE PERSONA AND INSTRUCTIONS (DR. K) ---\n\n",
        onboarding, planner
    ));
    prompt.push_str(PERSONA.trim_end());
    prompt.push_str("\n\n--- END: YOUR CORE PERSONA AND INSTRUCTIONS ---\n");

    prompt
}

/// Chronological transcript chunks as role-tagged chat messages
pub fn history_messages(chunks: &[TranscriptChunk]) -> Vec<Message> {
    chunks
        .iter()
        .map(|c| match c.role {
            Role::User => Message::user(c.content.clone()),
            Role::Assistant => Message::assistant(c.content.clone()),
        })
        .collect()
}

/// `role: content` lines, in the order given
pub fn render_transcript(chunks: &[TranscriptChunk], separator: &str) -> String {
    chunks
        .iter()
        .map(|c| format!("{}: {}", c.role.as_str(), c.content))
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn summary_prompt(chunks: &[TranscriptChunk]) -> String {
    format!(
        "Provide a concise, empathetic summary of this therapy session's key themes and \
         emotional patterns. Address the user in the second person (e.g., \"you explored...\"). \
         Transcript (oldest first):\n{}",
        render_transcript(chunks, "\n")
    )
}
