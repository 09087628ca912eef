//! Applies a natural-language change to a stored entry.
//!
//! The oracle returns a complete replacement entry; aggregates are always
//! recomputed here from the returned components and the replacement
//! overwrites the stored entry. `created_at` and `id` never change.

use crate::error::{MealLogError, Result};
use crate::model::{Component, Entry, MealCategory, Nutrients, OwnerId};
use crate::oracle::{Oracle, OracleRequest};
use crate::prompts;
use crate::provenance::{looks_synthesized, IdProvenance};
use crate::repository::EntryRepository;
use crate::structured;
use chrono::{DateTime, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Oracle aggregates further than this from the recomputed sum are logged.
const DRIFT_TOLERANCE: f64 = 0.5;

/// Why an apply attempt did not write anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationFailure {
    FabricatedId,
    NotFound,
    MalformedOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub success: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_entry: Option<Entry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<MutationFailure>,
}

impl MutationOutcome {
    fn applied(summary: String, entry: Entry) -> Self {
        Self {
            success: true,
            summary,
            updated_entry: Some(entry),
            failure: None,
        }
    }

    fn failed(failure: MutationFailure, summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
            updated_entry: None,
            failure: Some(failure),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ReplacementEntry {
    category: MealCategory,
    components: Vec<Component>,
    aggregates: Nutrients,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    occurred_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct MutationRecord {
    entry: ReplacementEntry,
    #[serde(default)]
    summary: String,
}

/// Models capitalize categories often enough that it is worth forgiving.
fn normalize_record(mut value: Value) -> Value {
    if let Some(category) = value.pointer_mut("/entry/category") {
        if let Some(s) = category.as_str() {
            *category = Value::String(s.trim().to_lowercase());
        }
    }
    value
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DD[ T]HH:MM[:SS]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub struct MutationApplier {
    oracle: Arc<dyn Oracle>,
    repository: Arc<dyn EntryRepository>,
    provenance: Arc<IdProvenance>,
}

impl MutationApplier {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        repository: Arc<dyn EntryRepository>,
        provenance: Arc<IdProvenance>,
    ) -> Self {
        Self {
            oracle,
            repository,
            provenance,
        }
    }

    /// Infrastructure failures are `Err`; every other failure is an
    /// unsuccessful outcome and leaves the store untouched.
    pub async fn apply(
        &self,
        owner: &OwnerId,
        target_id: &str,
        mutation_description: &str,
    ) -> Result<MutationOutcome> {
        if !self.provenance.contains(owner, target_id).await {
            if looks_synthesized(target_id) {
                warn!("Rejected placeholder entry id '{}' for {}", target_id, owner);
            } else {
                warn!(
                    "Rejected entry id '{}' for {}: not returned by a lookup",
                    target_id, owner
                );
            }
            return Ok(MutationOutcome::failed(
                MutationFailure::FabricatedId,
                MealLogError::FabricatedId(target_id.to_string()).to_string(),
            ));
        }

        let Some(existing) = self.repository.get(owner, target_id).await? else {
            return Ok(MutationOutcome::failed(
                MutationFailure::NotFound,
                format!("There is no entry '{}' to update.", target_id),
            ));
        };

        let request = OracleRequest::single_shot(
            prompts::mutation_instructions(),
            prompts::mutation_prompt(&existing, mutation_description),
        );
        let response = self.oracle.invoke(&request).await?;

        let parsed = match response.structured {
            Some(value) => Ok(value),
            None => structured::parse_value(&response.text),
        }
        .and_then(|value| structured::from_value::<MutationRecord>(normalize_record(value)));
        let record = match parsed {
            Ok(record) => record,
            Err(e) => {
                warn!("Mutation output for {} rejected: {}", target_id, e);
                return Ok(MutationOutcome::failed(
                    MutationFailure::MalformedOutput,
                    "I couldn't work out the updated entry, so nothing was changed.",
                ));
            }
        };

        let reported = record.entry.aggregates;
        let mut updated = existing;
        updated.category = record.entry.category;
        updated.set_components(record.entry.components);
        match record.entry.notes {
            Some(notes) if notes.trim().is_empty() => updated.notes = None,
            Some(notes) => updated.notes = Some(notes),
            None => {}
        }
        if let Some(ts) = record.entry.occurred_at.as_deref().and_then(parse_timestamp) {
            updated.occurred_at = ts;
        }

        let drift = reported.max_difference(updated.aggregates());
        if drift > DRIFT_TOLERANCE {
            warn!(
                "Oracle aggregates for {} drifted by {:.1} from the component sum; using the recomputed totals",
                target_id, drift
            );
        }

        match self.repository.update(owner, target_id, &updated).await {
            Ok(()) => {}
            Err(MealLogError::EntryNotFound(_)) => {
                return Ok(MutationOutcome::failed(
                    MutationFailure::NotFound,
                    format!("There is no entry '{}' to update.", target_id),
                ));
            }
            Err(e) => return Err(e),
        }

        let summary = if record.summary.trim().is_empty() {
            format!(
                "Updated your {} entry. Totals are now {}.",
                updated.category,
                updated.aggregates().render()
            )
        } else {
            record.summary.trim().to_string()
        };
        info!(
            "Applied mutation to {} for {}: {}",
            target_id, owner, summary
        );
        Ok(MutationOutcome::applied(summary, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryDraft;
    use crate::oracle::{OracleResponse, ScriptedOracle};
    use crate::repository::InMemoryEntryRepository;
    use serde_json::json;

    struct Fixture {
        oracle: Arc<ScriptedOracle>,
        repository: Arc<InMemoryEntryRepository>,
        provenance: Arc<IdProvenance>,
        applier: MutationApplier,
        owner: OwnerId,
    }

    fn fixture() -> Fixture {
        let oracle = Arc::new(ScriptedOracle::new());
        let repository = Arc::new(InMemoryEntryRepository::new());
        let provenance = Arc::new(IdProvenance::new());
        let applier = MutationApplier::new(oracle.clone(), repository.clone(), provenance.clone());
        Fixture {
            oracle,
            repository,
            provenance,
            applier,
            owner: OwnerId::new("owner-1"),
        }
    }

    async fn seed(f: &Fixture) -> String {
        let id = f
            .repository
            .create(
                &f.owner,
                EntryDraft::new(
                    MealCategory::Breakfast,
                    vec![Component::new("eggs", "2", Nutrients::new(180.0, 12.0, 0.0, 0.0))],
                )
                .with_notes("scrambled"),
            )
            .await
            .unwrap();
        f.provenance.register(&f.owner, [id.clone()]).await;
        id
    }

    #[tokio::test]
    async fn recomputes_aggregates_instead_of_trusting_the_oracle() {
        let f = fixture();
        let id = seed(&f).await;
        f.oracle.push(OracleResponse::structured(json!({
            "entry": {
                "category": "Breakfast",
                "components": [
                    {"name": "eggs", "quantity": "2", "calories": 180, "protein": 12},
                    {"name": "soda", "quantity": "1 can", "calories": 150}
                ],
                "aggregates": {"calories": 999, "protein": 12}
            },
            "summary": "Added a soda."
        })));

        let outcome = f.applier.apply(&f.owner, &id, "I also had a soda").await.unwrap();
        assert!(outcome.success);
        let stored = f.repository.get(&f.owner, &id).await.unwrap().unwrap();
        assert_eq!(stored.aggregates().calories, 330.0);
        assert!(stored.aggregates_consistent());
        assert_eq!(stored.notes.as_deref(), Some("scrambled"));
        assert_eq!(outcome.summary, "Added a soda.");
    }

    #[tokio::test]
    async fn schema_invalid_output_changes_nothing() {
        let f = fixture();
        let id = seed(&f).await;
        let before = f.repository.get(&f.owner, &id).await.unwrap().unwrap();
        f.oracle.push(OracleResponse::text(
            r#"{"entry": {"category": "brunch", "components": [], "aggregates": {}}, "summary": "x"}"#,
        ));

        let outcome = f.applier.apply(&f.owner, &id, "make it brunch").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(MutationFailure::MalformedOutput));
        assert_eq!(f.repository.get(&f.owner, &id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_id_is_rejected_before_any_call() {
        let f = fixture();
        seed(&f).await;
        let outcome = f
            .applier
            .apply(&f.owner, "9d0c7e1a-0000-4000-8000-000000000000", "make it lunch")
            .await
            .unwrap();
        assert_eq!(outcome.failure, Some(MutationFailure::FabricatedId));
        assert_eq!(f.oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn vanished_entry_is_not_found() {
        let f = fixture();
        let ghost = "5b2f3c4d-1111-4222-8333-444455556666";
        f.provenance.register(&f.owner, [ghost]).await;
        let outcome = f.applier.apply(&f.owner, ghost, "make it lunch").await.unwrap();
        assert_eq!(outcome.failure, Some(MutationFailure::NotFound));
    }

    #[test]
    fn timestamps_parse_leniently() {
        assert!(parse_timestamp("2026-10-19T08:30:00Z").is_some());
        assert!(parse_timestamp("2026-10-19 08:30").is_some());
        assert!(parse_timestamp("this morning").is_none());
    }
}
