//! Pending mutations: a resolved target waiting for the user's go-ahead.
//!
//! A record is created when disambiguation succeeds, survives exactly until
//! the user confirms, rejects or lets it expire, and is otherwise carried
//! forward untouched. Expiry is checked lazily whenever the record is read.

use crate::disambiguator::Confidence;
use crate::error::Result;
use crate::model::OwnerId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PendingKind {
    ApplyMutation,
}

/// Wire form of the record. Every field is optional so that a record handed
/// back by a caller with pieces missing still deserializes and is simply
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    #[serde(default)]
    pub kind: Option<PendingKind>,
    #[serde(default)]
    pub target_id: Option<String>,
    /// The user utterance that triggered disambiguation, replayed verbatim.
    #[serde(default)]
    pub mutation_description: Option<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The fields needed to execute a valid pending mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyMutation<'a> {
    pub kind: PendingKind,
    pub target_id: &'a str,
    pub mutation_description: &'a str,
}

impl PendingMutation {
    pub fn apply_mutation(
        target_id: impl Into<String>,
        mutation_description: impl Into<String>,
        confidence: Confidence,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            kind: Some(PendingKind::ApplyMutation),
            target_id: Some(target_id.into()),
            mutation_description: Some(mutation_description.into()),
            confidence: Some(confidence),
            expires_at: Some(now + ttl),
        }
    }

    /// The executable view of the record, or `None` if it is incomplete or
    /// `now` is past its deadline.
    pub fn ready_at(&self, now: DateTime<Utc>) -> Option<ReadyMutation<'_>> {
        let kind = self.kind?;
        let target_id = self.target_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let mutation_description = self
            .mutation_description
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        let expires_at = self.expires_at?;
        if now > expires_at {
            return None;
        }
        Some(ReadyMutation {
            kind,
            target_id,
            mutation_description,
        })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.ready_at(now).is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |deadline| now > deadline)
    }
}

/// Owner-keyed storage for the single pending record of each conversation.
#[async_trait]
pub trait PendingMutationStore: Send + Sync {
    async fn get(&self, owner: &OwnerId) -> Result<Option<PendingMutation>>;

    async fn put(&self, owner: &OwnerId, pending: PendingMutation) -> Result<()>;

    /// Removes and returns the owner's record.
    async fn clear(&self, owner: &OwnerId) -> Result<Option<PendingMutation>>;
}

#[derive(Default)]
pub struct InMemoryPendingStore {
    records: RwLock<HashMap<OwnerId, PendingMutation>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingMutationStore for InMemoryPendingStore {
    async fn get(&self, owner: &OwnerId) -> Result<Option<PendingMutation>> {
        Ok(self.records.read().await.get(owner).cloned())
    }

    async fn put(&self, owner: &OwnerId, pending: PendingMutation) -> Result<()> {
        self.records.write().await.insert(owner.clone(), pending);
        Ok(())
    }

    async fn clear(&self, owner: &OwnerId) -> Result<Option<PendingMutation>> {
        Ok(self.records.write().await.remove(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh(now: DateTime<Utc>) -> PendingMutation {
        PendingMutation::apply_mutation(
            "6f1c2d0e-8a57",
            "make it lunch",
            Confidence::High,
            now,
            Duration::seconds(300),
        )
    }

    #[test]
    fn fresh_record_is_ready_until_its_deadline() {
        let now = Utc::now();
        let pending = fresh(now);
        let ready = pending.ready_at(now).unwrap();
        assert_eq!(ready.target_id, "6f1c2d0e-8a57");
        assert_eq!(ready.mutation_description, "make it lunch");
        assert!(pending.is_valid_at(now + Duration::seconds(300)));
        assert!(!pending.is_valid_at(now + Duration::seconds(301)));
        assert!(pending.is_expired_at(now + Duration::seconds(301)));
    }

    #[test]
    fn incomplete_records_are_not_valid() {
        let now = Utc::now();
        let mut missing_target = fresh(now);
        missing_target.target_id = None;
        assert!(!missing_target.is_valid_at(now));

        let mut blank_description = fresh(now);
        blank_description.mutation_description = Some("  ".into());
        assert!(!blank_description.is_valid_at(now));

        let partial: PendingMutation =
            serde_json::from_value(json!({ "targetId": "6f1c2d0e-8a57" })).unwrap();
        assert!(!partial.is_valid_at(now));
    }

    #[test]
    fn wire_form_is_camel_case() {
        let json = serde_json::to_value(fresh(Utc::now())).unwrap();
        assert_eq!(json["kind"], "apply-mutation");
        assert_eq!(json["mutationDescription"], "make it lunch");
        assert_eq!(json["confidence"], "high");
    }

    #[tokio::test]
    async fn store_is_keyed_by_owner() {
        let store = InMemoryPendingStore::new();
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");
        store.put(&alice, fresh(Utc::now())).await.unwrap();

        assert!(store.get(&bob).await.unwrap().is_none());
        assert!(store.clear(&alice).await.unwrap().is_some());
        assert!(store.get(&alice).await.unwrap().is_none());
    }
}
