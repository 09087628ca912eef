//! Per-turn driver.
//!
//! One call to [`Orchestrator::run_turn`] handles one user message:
//!
//! 1. A valid pending mutation plus an affirmative reply is executed
//!    directly, without consulting the oracle.
//! 2. A negative reply discards the pending mutation and continues.
//! 3. Otherwise the oracle is looped through operation calls, bounded by
//!    `max_steps`. Calls requested in one step run concurrently and all of
//!    their results are appended, in request order, before the next step.
//! 4. The reply is the oracle's final text, else the text fragments it
//!    emitted along the way, else a deterministic reply derived from the
//!    last operation it invoked (a lookup goes through the disambiguator).

use crate::applier::{MutationApplier, MutationOutcome};
use crate::config::OrchestratorConfig;
use crate::confirmation::{Confirmation, ConfirmationMatcher};
use crate::disambiguator::{Disambiguator, Resolution};
use crate::error::Result;
use crate::model::{latest_user_text, recent_window, ConversationTurn, Entry, OwnerId, Role};
use crate::operations::{OperationResult, OperationSet};
use crate::oracle::{Oracle, OracleMessage, OracleRequest};
use crate::pending::PendingMutation;
use crate::prompts;
use crate::provenance::IdProvenance;
use crate::repository::EntryRepository;
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const GENERIC_ACKNOWLEDGEMENT: &str = "Got it.";
const NOTHING_FOUND: &str =
    "I couldn't find any recent entries to change. Could you tell me which meal you mean, or log it first?";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub owner_id: OwnerId,
    pub conversation: Vec<ConversationTurn>,
    #[serde(default)]
    pub pending_mutation: Option<PendingMutation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub response_text: String,
    #[serde(default)]
    pub pending_mutation: Option<PendingMutation>,
}

impl TurnResponse {
    fn new(response_text: impl Into<String>, pending_mutation: Option<PendingMutation>) -> Self {
        Self {
            response_text: response_text.into(),
            pending_mutation,
        }
    }
}

/// What the oracle loop left behind for reply extraction.
#[derive(Default)]
struct LoopOutcome {
    final_text: String,
    fragments: Vec<String>,
    last_result: Option<OperationResult>,
    steps: usize,
}

pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    operations: OperationSet,
    disambiguator: Disambiguator,
    applier: Arc<MutationApplier>,
    provenance: Arc<IdProvenance>,
    matcher: ConfirmationMatcher,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        repository: Arc<dyn EntryRepository>,
        config: OrchestratorConfig,
        matcher: ConfirmationMatcher,
    ) -> Self {
        let provenance = Arc::new(IdProvenance::new());
        let applier = Arc::new(MutationApplier::new(
            oracle.clone(),
            repository.clone(),
            provenance.clone(),
        ));
        let operations = OperationSet::new(
            repository,
            provenance.clone(),
            applier.clone(),
            config.recent_entries_limit,
        );
        let disambiguator = Disambiguator::new(oracle.clone(), provenance.clone());
        Self {
            oracle,
            operations,
            disambiguator,
            applier,
            provenance,
            matcher,
            config,
        }
    }

    /// Forgets every id looked up for `owner`; later mutations need a fresh
    /// lookup.
    pub async fn forget_owner(&self, owner: &OwnerId) {
        self.provenance.forget(owner).await;
    }

    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        let TurnRequest {
            owner_id: owner,
            conversation,
            pending_mutation,
        } = request;
        let now = Utc::now();
        let latest = latest_user_text(&conversation).unwrap_or_default();

        let mut pending = pending_mutation;
        if let Some(record) = &pending {
            if !record.is_valid_at(now) {
                if record.is_expired_at(now) {
                    info!("Pending mutation for {} expired", owner);
                } else {
                    debug!("Ignoring incomplete pending mutation for {}", owner);
                }
                pending = None;
            }
        }

        match self.matcher.classify(latest) {
            Confirmation::Affirmative => {
                if let Some(ready) = pending.as_ref().and_then(|p| p.ready_at(now)) {
                    info!(
                        "Executing confirmed mutation on {} for {}",
                        ready.target_id, owner
                    );
                    let outcome = self
                        .applier
                        .apply(&owner, ready.target_id, ready.mutation_description)
                        .await?;
                    return Ok(TurnResponse::new(confirmed_reply(&outcome), None));
                }
            }
            Confirmation::Negative => {
                if pending.take().is_some() {
                    info!("Pending mutation for {} discarded by the user", owner);
                }
            }
            Confirmation::Other => {}
        }

        let outcome = self.drive_oracle(&owner, &conversation).await?;

        if !outcome.final_text.is_empty() {
            return Ok(TurnResponse::new(outcome.final_text, pending));
        }
        if !outcome.fragments.is_empty() {
            return Ok(TurnResponse::new(outcome.fragments.join("\n"), pending));
        }

        debug!(
            "Oracle produced no text after {} steps; deriving the reply",
            outcome.steps
        );
        match outcome.last_result {
            Some(OperationResult::Found { entries }) => {
                self.resolve_candidates(&owner, &conversation, latest, &entries, pending)
                    .await
            }
            Some(result) => {
                let text = result
                    .silent_success_text()
                    .unwrap_or_else(|| GENERIC_ACKNOWLEDGEMENT.to_string());
                Ok(TurnResponse::new(text, pending))
            }
            None => Ok(TurnResponse::new(GENERIC_ACKNOWLEDGEMENT, pending)),
        }
    }

    async fn drive_oracle(
        &self,
        owner: &OwnerId,
        conversation: &[ConversationTurn],
    ) -> Result<LoopOutcome> {
        let mut request = OracleRequest {
            instructions: prompts::orchestrator_instructions(Utc::now()),
            messages: conversation.iter().map(to_oracle_message).collect(),
            operations: self.operations.catalog(),
        };
        let mut outcome = LoopOutcome::default();

        while outcome.steps < self.config.max_steps {
            outcome.steps += 1;
            let response = self.oracle.invoke(&request).await?;
            let text = response.text.trim().to_string();
            debug!(
                "Step {}: {} operation calls, {} chars of text",
                outcome.steps,
                response.operation_calls.len(),
                text.len()
            );

            if !response.has_operation_calls() {
                outcome.final_text = text;
                return Ok(outcome);
            }
            if !text.is_empty() {
                outcome.fragments.push(text.clone());
            }

            let calls = response.operation_calls;
            let results = join_all(
                calls
                    .iter()
                    .map(|call| self.operations.execute(owner, call)),
            )
            .await;

            request.messages.push(OracleMessage::Assistant {
                content: text,
                operation_calls: calls.clone(),
            });
            for (call, result) in calls.into_iter().zip(results) {
                let result = result?;
                request.messages.push(OracleMessage::OperationResult {
                    call_id: call.id,
                    name: call.name,
                    content: result.to_payload().to_string(),
                });
                outcome.last_result = Some(result);
            }
        }

        warn!(
            "Step budget of {} exhausted for {} without a final reply",
            self.config.max_steps, owner
        );
        Ok(outcome)
    }

    async fn resolve_candidates(
        &self,
        owner: &OwnerId,
        conversation: &[ConversationTurn],
        latest: &str,
        candidates: &[Entry],
        carried: Option<PendingMutation>,
    ) -> Result<TurnResponse> {
        let recent = recent_window(conversation, self.config.context_window);
        // A bare yes/no is an answer, not a change to offer.
        let intent = match self.matcher.classify(latest) {
            Confirmation::Other => latest.trim(),
            Confirmation::Affirmative | Confirmation::Negative => "",
        };
        match self
            .disambiguator
            .identify(owner, candidates, recent, intent)
            .await?
        {
            Resolution::NoCandidates => Ok(TurnResponse::new(NOTHING_FOUND, carried)),
            Resolution::Unresolved { response_text } => {
                Ok(TurnResponse::new(response_text, carried))
            }
            Resolution::Resolved(identification) => {
                if intent.is_empty() {
                    return Ok(TurnResponse::new(identification.response_text, carried));
                }
                let pending = PendingMutation::apply_mutation(
                    identification.target_id.clone(),
                    intent,
                    identification.confidence,
                    Utc::now(),
                    Duration::seconds(self.config.pending_ttl_secs),
                );
                info!(
                    "Pending mutation created on {} for {}",
                    identification.target_id, owner
                );
                Ok(TurnResponse::new(identification.response_text, Some(pending)))
            }
        }
    }
}

fn to_oracle_message(turn: &ConversationTurn) -> OracleMessage {
    match turn.role {
        Role::User => OracleMessage::User {
            content: turn.content.clone(),
        },
        Role::Assistant => OracleMessage::Assistant {
            content: turn.content.clone(),
            operation_calls: Vec::new(),
        },
    }
}

fn confirmed_reply(outcome: &MutationOutcome) -> String {
    if outcome.success {
        outcome.summary.clone()
    } else {
        format!("I couldn't apply that change: {}", outcome.summary)
    }
}
