//! The catalog of operations the oracle may request, and their executors.
//!
//! Arguments arrive as untyped JSON and are validated against the same
//! schema that is advertised in the catalog before anything runs. Failures
//! that are not infrastructure outages come back as
//! [`OperationResult::Failed`] so the oracle can talk about them.

pub mod result;
pub mod summary;

pub use result::{OperationResult, FABRICATED_ID_HINT};
pub use summary::AggregateSummary;

use crate::applier::{parse_timestamp, MutationApplier};
use crate::error::{MealLogError, Result};
use crate::model::{Component, EntryDraft, MealCategory, OwnerId};
use crate::oracle::{OperationCall, OperationSpec};
use crate::provenance::IdProvenance;
use crate::repository::EntryRepository;
use crate::structured::{self, parameters_schema};
use chrono::{Duration, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on find_recent_entries page size.
pub const MAX_RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateEntry,
    FindRecentEntries,
    ApplyMutation,
    GetAggregateSummary,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::CreateEntry,
        OperationKind::FindRecentEntries,
        OperationKind::ApplyMutation,
        OperationKind::GetAggregateSummary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::CreateEntry => "create_entry",
            OperationKind::FindRecentEntries => "find_recent_entries",
            OperationKind::ApplyMutation => "apply_mutation",
            OperationKind::GetAggregateSummary => "get_aggregate_summary",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            OperationKind::CreateEntry => {
                "Log a new meal entry. Call only after the user confirmed the items."
            }
            OperationKind::FindRecentEntries => {
                "List the user's most recently created entries, newest first, with their ids."
            }
            OperationKind::ApplyMutation => {
                "Change an existing entry. entry_id must come from find_recent_entries."
            }
            OperationKind::GetAggregateSummary => {
                "Nutrient totals for one day, overall and per meal category."
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateEntryArgs {
    pub category: MealCategory,
    pub components: Vec<Component>,
    #[serde(default)]
    pub notes: Option<String>,
    /// When the meal was eaten (RFC 3339). Defaults to now.
    #[serde(default)]
    pub occurred_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FindRecentEntriesArgs {
    /// How many entries to return (1-20).
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub category: Option<MealCategory>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ApplyMutationArgs {
    /// Id exactly as returned by find_recent_entries.
    pub entry_id: String,
    /// The user's requested change, in their own words.
    pub mutation_description: String,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AggregateSummaryArgs {
    /// Day as YYYY-MM-DD (UTC). Defaults to today.
    #[serde(default)]
    pub date: Option<String>,
}

pub struct OperationSet {
    repository: Arc<dyn EntryRepository>,
    provenance: Arc<IdProvenance>,
    applier: Arc<MutationApplier>,
    default_limit: usize,
}

impl OperationSet {
    pub fn new(
        repository: Arc<dyn EntryRepository>,
        provenance: Arc<IdProvenance>,
        applier: Arc<MutationApplier>,
        default_limit: usize,
    ) -> Self {
        Self {
            repository,
            provenance,
            applier,
            default_limit: default_limit.clamp(1, MAX_RECENT_LIMIT),
        }
    }

    pub fn catalog(&self) -> Vec<OperationSpec> {
        OperationKind::ALL
            .iter()
            .map(|kind| OperationSpec {
                name: kind.name().to_string(),
                description: kind.description().to_string(),
                parameters: match kind {
                    OperationKind::CreateEntry => parameters_schema::<CreateEntryArgs>(),
                    OperationKind::FindRecentEntries => {
                        parameters_schema::<FindRecentEntriesArgs>()
                    }
                    OperationKind::ApplyMutation => parameters_schema::<ApplyMutationArgs>(),
                    OperationKind::GetAggregateSummary => {
                        parameters_schema::<AggregateSummaryArgs>()
                    }
                },
            })
            .collect()
    }

    /// Runs one requested operation for `owner`. Only store or oracle
    /// outages are returned as errors.
    pub async fn execute(&self, owner: &OwnerId, call: &OperationCall) -> Result<OperationResult> {
        let Some(kind) = OperationKind::from_name(&call.name) else {
            info!("Oracle requested unknown operation '{}'", call.name);
            return Ok(OperationResult::Unknown {
                name: call.name.clone(),
            });
        };

        let outcome = match kind {
            OperationKind::CreateEntry => self.create_entry(owner, call).await,
            OperationKind::FindRecentEntries => self.find_recent_entries(owner, call).await,
            OperationKind::ApplyMutation => self.apply_mutation(owner, call).await,
            OperationKind::GetAggregateSummary => self.get_aggregate_summary(owner, call).await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => OperationResult::failed(kind, e.to_string()),
        };
        info!(
            "Operation {} for {} finished (success: {})",
            kind,
            owner,
            result.succeeded()
        );
        Ok(result)
    }

    async fn create_entry(&self, owner: &OwnerId, call: &OperationCall) -> Result<OperationResult> {
        let args: CreateEntryArgs = parse_args(call)?;
        let mut draft = EntryDraft::new(args.category, args.components);
        if let Some(raw) = args.occurred_at.as_deref() {
            let occurred_at = parse_timestamp(raw).ok_or_else(|| {
                MealLogError::InvalidInput(format!("occurred_at '{}' is not a timestamp", raw))
            })?;
            draft = draft.with_occurred_at(occurred_at);
        }
        if let Some(notes) = args.notes.filter(|n| !n.trim().is_empty()) {
            draft = draft.with_notes(notes);
        }

        let id = self.repository.create(owner, draft).await?;
        let entry = self
            .repository
            .get(owner, &id)
            .await?
            .ok_or_else(|| {
                MealLogError::StoreUnavailable(format!("entry {} vanished after create", id))
            })?;
        Ok(OperationResult::Created { entry })
    }

    async fn find_recent_entries(
        &self,
        owner: &OwnerId,
        call: &OperationCall,
    ) -> Result<OperationResult> {
        let args: FindRecentEntriesArgs = parse_args(call)?;
        let limit = args
            .limit
            .map(|l| (l as usize).clamp(1, MAX_RECENT_LIMIT))
            .unwrap_or(self.default_limit);

        let entries = match args.category {
            Some(category) => self
                .repository
                .list_recent(owner, MAX_RECENT_LIMIT)
                .await?
                .into_iter()
                .filter(|e| e.category == category)
                .take(limit)
                .collect(),
            None => self.repository.list_recent(owner, limit).await?,
        };
        self.provenance
            .register(owner, entries.iter().map(|e| e.id.clone()))
            .await;
        debug!("find_recent_entries returned {} entries", entries.len());
        Ok(OperationResult::Found { entries })
    }

    async fn apply_mutation(
        &self,
        owner: &OwnerId,
        call: &OperationCall,
    ) -> Result<OperationResult> {
        let args: ApplyMutationArgs = parse_args(call)?;
        let outcome = self
            .applier
            .apply(owner, args.entry_id.trim(), &args.mutation_description)
            .await?;
        Ok(OperationResult::Mutated(outcome))
    }

    async fn get_aggregate_summary(
        &self,
        owner: &OwnerId,
        call: &OperationCall,
    ) -> Result<OperationResult> {
        let args: AggregateSummaryArgs = parse_args(call)?;
        let date = match args.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                MealLogError::InvalidInput(format!("date '{}' is not YYYY-MM-DD", raw))
            })?,
            None => Utc::now().date_naive(),
        };
        let from = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let to = from + Duration::days(1);
        let entries = self.repository.list_between(owner, from, to).await?;
        Ok(OperationResult::Summary(AggregateSummary::from_entries(
            date, &entries,
        )))
    }
}

fn parse_args<T>(call: &OperationCall) -> Result<T>
where
    T: serde::de::DeserializeOwned + JsonSchema,
{
    let arguments = if call.arguments.is_null() {
        serde_json::json!({})
    } else {
        call.arguments.clone()
    };
    structured::from_value(arguments).map_err(|e| {
        MealLogError::InvalidInput(format!("invalid arguments for {}: {}", call.name, e))
    })
}
