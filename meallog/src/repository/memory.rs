//! In-memory entry repository
//!
//! Used by tests and by the `memory` storage backend. An availability switch
//! lets callers simulate an unreachable store.

use super::EntryRepository;
use crate::error::{MealLogError, Result};
use crate::model::{Entry, EntryDraft, OwnerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct InMemoryEntryRepository {
    /// Per owner, in creation order.
    entries: RwLock<HashMap<OwnerId, Vec<Entry>>>,
    available: AtomicBool,
}

impl InMemoryEntryRepository {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored entries for an owner, bypassing the availability switch.
    pub async fn count(&self, owner: &OwnerId) -> usize {
        self.entries
            .read()
            .await
            .get(owner)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MealLogError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryEntryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryRepository for InMemoryEntryRepository {
    async fn create(&self, owner: &OwnerId, draft: EntryDraft) -> Result<String> {
        self.ensure_available()?;
        let id = Uuid::new_v4().to_string();
        let entry = draft.into_entry(id.clone(), Utc::now());
        let mut entries = self.entries.write().await;
        entries.entry(owner.clone()).or_default().push(entry);
        Ok(id)
    }

    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<Entry>> {
        self.ensure_available()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(owner)
            .and_then(|list| list.iter().find(|e| e.id == id))
            .cloned())
    }

    async fn update(&self, owner: &OwnerId, id: &str, entry: &Entry) -> Result<()> {
        self.ensure_available()?;
        let mut entries = self.entries.write().await;
        let slot = entries
            .get_mut(owner)
            .and_then(|list| list.iter_mut().find(|e| e.id == id))
            .ok_or_else(|| MealLogError::EntryNotFound(id.to_string()))?;

        let created_at = slot.created_at;
        let mut replacement = entry.clone();
        replacement.id = id.to_string();
        replacement.created_at = created_at;
        *slot = replacement;
        Ok(())
    }

    async fn list_recent(&self, owner: &OwnerId, limit: usize) -> Result<Vec<Entry>> {
        self.ensure_available()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(owner)
            .map(|list| list.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_between(
        &self,
        owner: &OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Entry>> {
        self.ensure_available()?;
        let entries = self.entries.read().await;
        let mut results: Vec<Entry> = entries
            .get(owner)
            .map(|list| {
                list.iter()
                    .filter(|e| e.occurred_at >= from && e.occurred_at < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        results.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, MealCategory, Nutrients};
    use chrono::Duration;

    fn draft(name: &str, calories: f64) -> EntryDraft {
        EntryDraft::new(
            MealCategory::Snack,
            vec![Component::new(name, "1", Nutrients::new(calories, 0.0, 0.0, 0.0))],
        )
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_limited() {
        let repo = InMemoryEntryRepository::new();
        let owner = OwnerId::new("alice");
        let first = repo.create(&owner, draft("apple", 95.0)).await.unwrap();
        let second = repo.create(&owner, draft("soda", 150.0)).await.unwrap();
        let third = repo.create(&owner, draft("chips", 160.0)).await.unwrap();

        let recent = repo.list_recent(&owner, 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![third, second]);
        assert!(!ids.contains(&first));
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let repo = InMemoryEntryRepository::new();
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");
        let id = repo.create(&alice, draft("apple", 95.0)).await.unwrap();

        assert!(repo.get(&bob, &id).await.unwrap().is_none());
        assert!(repo.list_recent(&bob, 5).await.unwrap().is_empty());

        let entry = repo.get(&alice, &id).await.unwrap().unwrap();
        let err = repo.update(&bob, &id, &entry).await.unwrap_err();
        assert!(matches!(err, MealLogError::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn update_keeps_created_at() {
        let repo = InMemoryEntryRepository::new();
        let owner = OwnerId::new("alice");
        let id = repo.create(&owner, draft("apple", 95.0)).await.unwrap();
        let original = repo.get(&owner, &id).await.unwrap().unwrap();

        let mut changed = original.clone();
        changed.category = MealCategory::Lunch;
        changed.created_at = original.created_at - Duration::days(3);
        repo.update(&owner, &id, &changed).await.unwrap();

        let stored = repo.get(&owner, &id).await.unwrap().unwrap();
        assert_eq!(stored.category, MealCategory::Lunch);
        assert_eq!(stored.created_at, original.created_at);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let repo = InMemoryEntryRepository::new();
        let owner = OwnerId::new("alice");
        repo.set_available(false);

        assert!(matches!(
            repo.create(&owner, draft("apple", 95.0)).await,
            Err(MealLogError::StoreUnavailable(_))
        ));
        assert!(matches!(
            repo.list_recent(&owner, 5).await,
            Err(MealLogError::StoreUnavailable(_))
        ));
        assert!(matches!(
            repo.get(&owner, "x").await,
            Err(MealLogError::StoreUnavailable(_))
        ));
    }
}
