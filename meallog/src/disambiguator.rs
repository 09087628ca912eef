//! Resolves a list of candidate entries to the single one the user means.
//!
//! Zero candidates resolve to nothing, one candidate is described without
//! consulting the oracle, and two or more cost exactly one tool-less oracle
//! call whose answer must name one of the supplied ids.

use crate::error::Result;
use crate::model::{ConversationTurn, Entry, OwnerId};
use crate::oracle::{Oracle, OracleRequest};
use crate::prompts;
use crate::provenance::IdProvenance;
use crate::structured::{self, StructuredOutputError};
use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        })
    }
}

/// A resolved target plus the text to show the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identification {
    pub target_id: String,
    pub confidence: Confidence,
    pub rationale: String,
    pub response_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Nothing to choose from; the caller asks the user to clarify.
    NoCandidates,
    Resolved(Identification),
    /// The oracle's pick was unusable. `response_text` lists every candidate
    /// so the user can choose by hand.
    Unresolved { response_text: String },
}

pub struct Disambiguator {
    oracle: Arc<dyn Oracle>,
    provenance: Arc<IdProvenance>,
}

impl Disambiguator {
    pub fn new(oracle: Arc<dyn Oracle>, provenance: Arc<IdProvenance>) -> Self {
        Self { oracle, provenance }
    }

    /// `candidates` are ordered most recently created first. Only an oracle
    /// outage is an error; every other failure becomes `Unresolved`.
    pub async fn identify(
        &self,
        owner: &OwnerId,
        candidates: &[Entry],
        recent_turns: &[ConversationTurn],
        user_intent: &str,
    ) -> Result<Resolution> {
        let identification = match candidates {
            [] => return Ok(Resolution::NoCandidates),
            [only] => describe_single(only, user_intent),
            _ => match self.ask_oracle(candidates, recent_turns, user_intent).await? {
                Ok(identification) => identification,
                Err(reason) => {
                    warn!("Disambiguation failed for {}: {}", owner, reason);
                    return Ok(Resolution::Unresolved {
                        response_text: list_for_manual_choice(candidates),
                    });
                }
            },
        };

        self.provenance
            .register(owner, [identification.target_id.clone()])
            .await;
        info!(
            "Resolved target {} for {} ({} confidence, {} candidates)",
            identification.target_id,
            owner,
            identification.confidence,
            candidates.len()
        );
        Ok(Resolution::Resolved(identification))
    }

    /// Outer error is an oracle outage; inner error is a local parse failure.
    async fn ask_oracle(
        &self,
        candidates: &[Entry],
        recent_turns: &[ConversationTurn],
        user_intent: &str,
    ) -> Result<std::result::Result<Identification, String>> {
        let request = OracleRequest::single_shot(
            prompts::disambiguation_instructions(),
            prompts::disambiguation_prompt(recent_turns, user_intent, candidates),
        );
        let response = self.oracle.invoke(&request).await?;

        let parsed: std::result::Result<Identification, StructuredOutputError> =
            match response.structured {
                Some(value) => structured::from_value(value),
                None => structured::parse_record(&response.text),
            };
        let identification = match parsed {
            Ok(identification) => identification,
            Err(e) => return Ok(Err(e.to_string())),
        };

        if !candidates.iter().any(|c| c.id == identification.target_id) {
            return Ok(Err(format!(
                "target id '{}' is not one of the candidates",
                identification.target_id
            )));
        }
        debug!("Disambiguation rationale: {}", identification.rationale);
        Ok(Ok(identification))
    }
}

fn describe_single(entry: &Entry, user_intent: &str) -> Identification {
    let items = if entry.components().is_empty() {
        "no items".to_string()
    } else {
        entry.components().iter().map(|c| c.render()).join(", ")
    };
    let intent = user_intent.trim();
    let ask = if intent.is_empty() {
        "What would you like to change about it?".to_string()
    } else {
        format!(
            "Say yes to apply \"{}\", or what would you like to change about it?",
            intent
        )
    };
    Identification {
        target_id: entry.id.clone(),
        confidence: Confidence::High,
        rationale: "only one recent entry matched".to_string(),
        response_text: format!(
            "I found your {} from {}: {}. Totals: {}. {}",
            entry.category,
            entry.occurred_at.format("%Y-%m-%d %H:%M UTC"),
            items,
            entry.aggregates().render(),
            ask
        ),
    }
}

fn list_for_manual_choice(candidates: &[Entry]) -> String {
    let lines = candidates
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "{}. {} at {}: {} ({})",
                i + 1,
                entry.category,
                entry.occurred_at.format("%Y-%m-%d %H:%M UTC"),
                entry.components().iter().map(|c| c.name.as_str()).join(", "),
                entry.aggregates().render()
            )
        })
        .join("\n");
    format!(
        "I couldn't tell which entry you meant. Here are your recent entries:\n{}\nWhich one should I change?",
        lines
    )
}
