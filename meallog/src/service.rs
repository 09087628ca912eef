//! Stateful façade over the orchestrator.
//!
//! Keeps each owner's pending mutation between turns so that callers only
//! hand over the conversation. Turns for the same owner are serialized.

use crate::config::MealLogConfig;
use crate::confirmation::{Confirmation, ConfirmationMatcher};
use crate::error::Result;
use crate::model::{latest_user_text, ConversationTurn, OwnerId};
use crate::oracle::Oracle;
use crate::orchestrator::{Orchestrator, TurnRequest};
use crate::pending::{InMemoryPendingStore, PendingMutationStore};
use crate::repository::EntryRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

pub struct ChatService {
    orchestrator: Orchestrator,
    pending: Arc<dyn PendingMutationStore>,
    matcher: ConfirmationMatcher,
    turn_locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(
        orchestrator: Orchestrator,
        pending: Arc<dyn PendingMutationStore>,
        matcher: ConfirmationMatcher,
    ) -> Self {
        Self {
            orchestrator,
            pending,
            matcher,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wires an orchestrator and an in-memory pending store from config.
    pub fn from_config(
        config: &MealLogConfig,
        oracle: Arc<dyn Oracle>,
        repository: Arc<dyn EntryRepository>,
    ) -> Result<Self> {
        let matcher = ConfirmationMatcher::from_config(&config.confirmation)?;
        let orchestrator = Orchestrator::new(
            oracle,
            repository,
            config.orchestrator.clone(),
            matcher.clone(),
        );
        Ok(Self::new(
            orchestrator,
            Arc::new(InMemoryPendingStore::new()),
            matcher,
        ))
    }

    async fn owner_lock(&self, owner: &OwnerId) -> Arc<Mutex<()>> {
        self.turn_locks
            .lock()
            .await
            .entry(owner.clone())
            .or_default()
            .clone()
    }

    /// Forgets the lock of an owner no other turn is waiting on.
    async fn release_owner_lock(&self, owner: &OwnerId, lock: Arc<Mutex<()>>) {
        let mut locks = self.turn_locks.lock().await;
        // One reference in the map plus ours means nobody else holds it.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(owner);
        }
    }

    /// Handles the latest user message in `conversation` and returns the
    /// reply text.
    pub async fn handle(
        &self,
        owner: &OwnerId,
        conversation: Vec<ConversationTurn>,
    ) -> Result<String> {
        let lock = self.owner_lock(owner).await;
        let result = {
            let _turn = lock.lock().await;
            self.run_locked(owner, conversation).await
        };
        self.release_owner_lock(owner, lock).await;
        result
    }

    /// Drops the owner's pending mutation and the ids looked up for them.
    pub async fn reset(&self, owner: &OwnerId) -> Result<()> {
        let lock = self.owner_lock(owner).await;
        let result = {
            let _turn = lock.lock().await;
            self.orchestrator.forget_owner(owner).await;
            self.pending.clear(owner).await.map(|_| ())
        };
        self.release_owner_lock(owner, lock).await;
        result
    }

    async fn run_locked(
        &self,
        owner: &OwnerId,
        conversation: Vec<ConversationTurn>,
    ) -> Result<String> {
        let pending_mutation = self.pending.get(owner).await?;
        let answered = latest_user_text(&conversation)
            .map(|text| self.matcher.classify(text) != Confirmation::Other)
            .unwrap_or(false);

        let request = TurnRequest {
            owner_id: owner.clone(),
            conversation,
            pending_mutation,
        };
        match self.orchestrator.run_turn(request).await {
            Ok(response) => {
                match response.pending_mutation {
                    Some(pending) => self.pending.put(owner, pending).await?,
                    None => {
                        self.pending.clear(owner).await?;
                    }
                }
                Ok(response.response_text)
            }
            Err(e) => {
                error!("Turn for {} failed: {}", owner, e);
                // A confirmed or rejected record is spent even if the turn failed.
                if answered && self.pending.clear(owner).await?.is_some() {
                    debug!("Cleared answered pending mutation for {}", owner);
                }
                Err(e)
            }
        }
    }

    pub async fn has_pending(&self, owner: &OwnerId) -> Result<bool> {
        Ok(self.pending.get(owner).await?.is_some())
    }
}
