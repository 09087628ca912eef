//! Typed operation outcomes and their wire payloads.

use super::summary::AggregateSummary;
use super::OperationKind;
use crate::applier::{MutationFailure, MutationOutcome};
use crate::model::Entry;
use itertools::Itertools;
use serde_json::{json, Value};

/// Hint attached to a rejected id so the oracle recovers by looking up.
pub const FABRICATED_ID_HINT: &str =
    "call find_recent_entries and use an id from its result";

#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Created { entry: Entry },
    Found { entries: Vec<Entry> },
    Mutated(MutationOutcome),
    Summary(AggregateSummary),
    Failed {
        operation: OperationKind,
        error: String,
        hint: Option<String>,
    },
    Unknown { name: String },
}

impl OperationResult {
    pub fn failed(operation: OperationKind, error: impl Into<String>) -> Self {
        OperationResult::Failed {
            operation,
            error: error.into(),
            hint: None,
        }
    }

    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            OperationResult::Created { .. } => Some(OperationKind::CreateEntry),
            OperationResult::Found { .. } => Some(OperationKind::FindRecentEntries),
            OperationResult::Mutated(_) => Some(OperationKind::ApplyMutation),
            OperationResult::Summary(_) => Some(OperationKind::GetAggregateSummary),
            OperationResult::Failed { operation, .. } => Some(*operation),
            OperationResult::Unknown { .. } => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            OperationResult::Created { .. }
            | OperationResult::Found { .. }
            | OperationResult::Summary(_) => true,
            OperationResult::Mutated(outcome) => outcome.success,
            OperationResult::Failed { .. } | OperationResult::Unknown { .. } => false,
        }
    }

    /// JSON handed back to the oracle as the operation's result.
    pub fn to_payload(&self) -> Value {
        match self {
            OperationResult::Created { entry } => json!({
                "success": true,
                "entry": entry,
            }),
            OperationResult::Found { entries } => json!({
                "success": true,
                "count": entries.len(),
                "entries": entries,
            }),
            OperationResult::Mutated(outcome) => {
                let mut payload = json!({
                    "success": outcome.success,
                    "summary": outcome.summary,
                });
                if let Some(entry) = &outcome.updated_entry {
                    payload["entry"] = json!(entry);
                }
                if let Some(failure) = outcome.failure {
                    payload["error"] = json!(failure);
                    if failure == MutationFailure::FabricatedId {
                        payload["hint"] = json!(FABRICATED_ID_HINT);
                    }
                }
                payload
            }
            OperationResult::Summary(summary) => json!({
                "success": true,
                "summary": summary,
            }),
            OperationResult::Failed {
                operation,
                error,
                hint,
            } => {
                let mut payload = json!({
                    "success": false,
                    "operation": operation.name(),
                    "error": error,
                });
                if let Some(hint) = hint {
                    payload["hint"] = json!(hint);
                }
                payload
            }
            OperationResult::Unknown { name } => json!({
                "success": false,
                "error": format!("unknown operation '{}'", name),
            }),
        }
    }

    /// Deterministic reply used when the oracle went quiet after this
    /// operation. `None` for lookups, which go through disambiguation.
    pub fn silent_success_text(&self) -> Option<String> {
        match self {
            OperationResult::Created { entry } => Some(format!(
                "Logged your {}: {}. Totals: {}.",
                entry.category,
                item_names(entry),
                entry.aggregates().render()
            )),
            OperationResult::Mutated(outcome) if outcome.success => Some(outcome.summary.clone()),
            OperationResult::Mutated(outcome) => Some(format!(
                "I couldn't update that entry: {}",
                outcome.summary
            )),
            OperationResult::Summary(summary) => Some(summary.render()),
            OperationResult::Found { .. } => None,
            OperationResult::Failed {
                operation, error, ..
            } => Some(match operation {
                OperationKind::CreateEntry => format!("I couldn't log that entry: {}", error),
                OperationKind::FindRecentEntries => {
                    format!("I couldn't look up your recent entries: {}", error)
                }
                OperationKind::ApplyMutation => format!("I couldn't update that entry: {}", error),
                OperationKind::GetAggregateSummary => {
                    format!("I couldn't total up that day: {}", error)
                }
            }),
            OperationResult::Unknown { .. } => None,
        }
    }
}

fn item_names(entry: &Entry) -> String {
    if entry.components().is_empty() {
        "no items".to_string()
    } else {
        entry
            .components()
            .iter()
            .map(|c| {
                if c.quantity.trim().is_empty() {
                    c.name.clone()
                } else {
                    format!("{} ({})", c.name, c.quantity)
                }
            })
            .join(", ")
    }
}
