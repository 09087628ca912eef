#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meallog::config::OrchestratorConfig;
use meallog::oracle::{OperationCall, OracleResponse, ScriptedOracle};
use meallog::{
    Component, ConfirmationMatcher, ConversationTurn, Entry, EntryDraft, EntryRepository,
    InMemoryEntryRepository, MealCategory, MealLogError, Nutrients, Orchestrator, OwnerId,
    TurnRequest,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Harness<R = InMemoryEntryRepository> {
    pub oracle: Arc<ScriptedOracle>,
    pub repository: Arc<R>,
    pub orchestrator: Orchestrator,
    pub owner: OwnerId,
}

pub fn harness() -> Harness {
    harness_with(OrchestratorConfig::default())
}

pub fn harness_with(config: OrchestratorConfig) -> Harness {
    build_harness(InMemoryEntryRepository::new(), config)
}

/// Harness whose store hands out ids "A", "B", ... in creation order.
pub fn lettered_harness() -> Harness<LetteredRepository> {
    build_harness(LetteredRepository::default(), OrchestratorConfig::default())
}

fn build_harness<R>(repository: R, config: OrchestratorConfig) -> Harness<R>
where
    R: EntryRepository + 'static,
{
    let oracle = Arc::new(ScriptedOracle::new());
    let repository = Arc::new(repository);
    let orchestrator = Orchestrator::new(
        oracle.clone(),
        repository.clone(),
        config,
        ConfirmationMatcher::default(),
    );
    Harness {
        oracle,
        repository,
        orchestrator,
        owner: OwnerId::new("owner-1"),
    }
}

impl<R: EntryRepository> Harness<R> {
    pub async fn seed(&self, category: MealCategory, components: Vec<Component>) -> String {
        self.repository
            .create(&self.owner, EntryDraft::new(category, components))
            .await
            .unwrap()
    }

    pub async fn stored(&self, id: &str) -> Entry {
        self.repository.get(&self.owner, id).await.unwrap().unwrap()
    }

    pub fn request(&self, conversation: Vec<ConversationTurn>) -> TurnRequest {
        TurnRequest {
            owner_id: self.owner.clone(),
            conversation,
            pending_mutation: None,
        }
    }

    /// Oracle requests made without an operation catalog (single-shot calls).
    pub fn single_shot_calls(&self) -> usize {
        self.oracle
            .requests()
            .iter()
            .filter(|r| r.operations.is_empty())
            .count()
    }
}

pub fn eggs() -> Component {
    Component::new("eggs", "2 large", Nutrients::new(180.0, 12.0, 0.0, 0.0))
}

pub fn call(id: &str, name: &str, arguments: Value) -> OracleResponse {
    OracleResponse::calls(vec![OperationCall::new(id, name, arguments)])
}

pub fn find_recent() -> OracleResponse {
    call("call_find", "find_recent_entries", json!({}))
}

pub fn silence() -> OracleResponse {
    OracleResponse::text("")
}

pub fn mutation_reply(
    category: &str,
    components: Value,
    aggregates: Value,
    summary: &str,
) -> OracleResponse {
    OracleResponse::structured(json!({
        "entry": {
            "category": category,
            "components": components,
            "aggregates": aggregates,
        },
        "summary": summary,
    }))
}

/// Entry store with short sequential ids, in creation order.
#[derive(Default)]
pub struct LetteredRepository {
    entries: Mutex<Vec<(OwnerId, Entry)>>,
}

#[async_trait]
impl EntryRepository for LetteredRepository {
    async fn create(&self, owner: &OwnerId, draft: EntryDraft) -> meallog::Result<String> {
        let mut entries = self.entries.lock().await;
        let id = char::from(b'A' + entries.len() as u8).to_string();
        entries.push((owner.clone(), draft.into_entry(id.clone(), Utc::now())));
        Ok(id)
    }

    async fn get(&self, owner: &OwnerId, id: &str) -> meallog::Result<Option<Entry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .find(|(o, e)| o == owner && e.id == id)
            .map(|(_, e)| e.clone()))
    }

    async fn update(&self, owner: &OwnerId, id: &str, entry: &Entry) -> meallog::Result<()> {
        let mut entries = self.entries.lock().await;
        let (_, slot) = entries
            .iter_mut()
            .find(|(o, e)| o == owner && e.id == id)
            .ok_or_else(|| MealLogError::EntryNotFound(id.to_string()))?;
        let created_at = slot.created_at;
        *slot = entry.clone();
        slot.id = id.to_string();
        slot.created_at = created_at;
        Ok(())
    }

    async fn list_recent(&self, owner: &OwnerId, limit: usize) -> meallog::Result<Vec<Entry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|(o, _)| o == owner)
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn list_between(
        &self,
        owner: &OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> meallog::Result<Vec<Entry>> {
        let entries = self.entries.lock().await;
        let mut found: Vec<Entry> = entries
            .iter()
            .filter(|(o, e)| o == owner && e.occurred_at >= from && e.occurred_at < to)
            .map(|(_, e)| e.clone())
            .collect();
        found.sort_by_key(|e| e.occurred_at);
        Ok(found)
    }
}
