//! Instruction text and prompt rendering for the three kinds of oracle call.

use crate::model::{ConversationTurn, Entry, Role};
use chrono::{DateTime, Utc};
use itertools::Itertools;

const ORCHESTRATOR_INSTRUCTIONS: &str = r#"You are a meal-logging assistant. You help the user record meals and fix entries they already logged.

Operations:
- create_entry: store a new meal entry. Only call it after the user has confirmed the items you are about to log.
- find_recent_entries: list the user's most recent entries with their ids.
- apply_mutation: change an existing entry. Pass the entry_id exactly as returned by find_recent_entries and the user's own words as mutation_description.
- get_aggregate_summary: totals for one day.

Rules:
- Never invent, guess or shorten an entry id. If you do not have an id from find_recent_entries in this conversation, call find_recent_entries first.
- When the user wants to correct, extend or reduce something they already logged, look the entry up before changing anything.
- If apply_mutation fails because the id was rejected, call find_recent_entries and use an id from its result.
- Keep replies short and concrete. Mention totals when they changed."#;

const DISAMBIGUATION_INSTRUCTIONS: &str = r#"You decide which logged meal entry the user is talking about.

You receive the recent conversation, the user's latest message and a numbered list of candidate entries. Pick exactly one candidate.

Rules:
- targetId must be copied character for character from one of the candidate ids. Never invent an id.
- Prefer the candidate whose category, time or items match what the user said.
- If the user only says "that", "it" or similar with no other detail, prefer the most recently created candidate (the first one in the list).
- responseText describes the chosen entry (category, time, items, totals), states the change you understood, and asks the user to confirm.

Reply with a single JSON object and nothing else:
{"targetId": "<candidate id>", "confidence": "high" | "medium" | "low", "rationale": "<one sentence>", "responseText": "<message to the user>"}"#;

const MUTATION_INSTRUCTIONS: &str = r#"You update one logged meal entry according to the user's requested change.

Read the existing entry carefully, apply the change, and return the COMPLETE replacement entry: every component, including the ones that did not change. Do not return a partial patch.

Guidance:
- Changing only the category keeps every component as it is.
- "I only ate half" (or another fraction) scales every component's quantity and nutrients by that fraction.
- Adding an item appends one component with your best nutrient estimate.
- Removing an item drops that component.
- Note changes only touch notes.
- aggregates must be the sum of the components' nutrients.
- category is one of: breakfast, lunch, dinner, snack.
- occurredAt is only needed when the user corrects when the meal was eaten (RFC 3339).

Reply with a single JSON object and nothing else:
{"entry": {"category": "...", "components": [{"name": "...", "quantity": "...", "calories": 0, "protein": 0, "carbs": 0, "fat": 0}], "aggregates": {"calories": 0, "protein": 0, "carbs": 0, "fat": 0}, "notes": "...", "occurredAt": "..."}, "summary": "<one short sentence describing what changed>"}"#;

pub fn orchestrator_instructions(now: DateTime<Utc>) -> String {
    format!(
        "{}\n\nCurrent time: {}",
        ORCHESTRATOR_INSTRUCTIONS,
        now.format("%Y-%m-%d %H:%M UTC")
    )
}

pub fn disambiguation_instructions() -> &'static str {
    DISAMBIGUATION_INSTRUCTIONS
}

pub fn mutation_instructions() -> &'static str {
    MUTATION_INSTRUCTIONS
}

fn render_turns(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| {
            let speaker = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, t.content)
        })
        .join("\n")
}

/// Numbered candidate list, most recently created first.
pub fn render_candidates(candidates: &[Entry]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {}", i + 1, entry.render_line()))
        .join("\n")
}

pub fn disambiguation_prompt(
    recent_turns: &[ConversationTurn],
    user_intent: &str,
    candidates: &[Entry],
) -> String {
    format!(
        "Recent conversation:\n{}\n\nLatest user message:\n{}\n\nCandidates (most recently created first):\n{}",
        render_turns(recent_turns),
        user_intent,
        render_candidates(candidates)
    )
}

pub fn mutation_prompt(existing: &Entry, mutation_description: &str) -> String {
    let existing_json = serde_json::json!({
        "category": existing.category,
        "components": existing.components(),
        "aggregates": existing.aggregates(),
        "notes": existing.notes,
        "occurredAt": existing.occurred_at.to_rfc3339(),
    });
    format!(
        "Existing entry:\n{}\n\nRequested change:\n{}",
        serde_json::to_string_pretty(&existing_json).unwrap_or_else(|_| existing.render_line()),
        mutation_description
    )
}
