//! Conversational meal-log editing.
//!
//! Resolves which logged entry a user is talking about, confirms the change
//! with them and applies it exactly once, driving an unreliable
//! text-generation oracle through a small set of typed operations.

pub mod applier;
pub mod config;
pub mod confirmation;
pub mod disambiguator;
pub mod error;
pub mod model;
pub mod operations;
pub mod oracle;
pub mod orchestrator;
pub mod pending;
pub mod prompts;
pub mod provenance;
pub mod repository;
pub mod service;
pub mod structured;

pub use applier::{MutationApplier, MutationFailure, MutationOutcome};
pub use config::MealLogConfig;
pub use confirmation::{Confirmation, ConfirmationMatcher};
pub use disambiguator::{Confidence, Disambiguator, Identification, Resolution};
pub use error::{MealLogError, Result};
pub use model::{
    Component, ConversationTurn, Entry, EntryDraft, MealCategory, Nutrients, OwnerId, Role,
};
pub use operations::{OperationKind, OperationResult, OperationSet};
pub use oracle::{Oracle, OracleFactory, OracleResponse, ScriptedOracle};
pub use orchestrator::{Orchestrator, TurnRequest, TurnResponse};
pub use pending::{InMemoryPendingStore, PendingMutation, PendingMutationStore};
pub use provenance::IdProvenance;
pub use repository::{EntryRepository, InMemoryEntryRepository, SqliteEntryRepository};
pub use service::ChatService;
