//! Entry repository abstraction.
//!
//! The store is an external collaborator: a per-owner keyed collection with
//! point reads and writes plus ordered queries. Implementations must return
//! [`MealLogError::StoreUnavailable`](crate::error::MealLogError::StoreUnavailable)
//! when the backing store cannot be reached, never substitute data.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryEntryRepository;
pub use sqlite::SqliteEntryRepository;

use crate::error::Result;
use crate::model::{Entry, EntryDraft, OwnerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Stores a new entry and returns the id the repository assigned.
    async fn create(&self, owner: &OwnerId, draft: EntryDraft) -> Result<String>;

    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<Entry>>;

    /// Overwrites the stored entry. The stored `created_at` is kept.
    /// Fails with `EntryNotFound` if the owner has no such entry.
    async fn update(&self, owner: &OwnerId, id: &str, entry: &Entry) -> Result<()>;

    /// Most recently created first.
    async fn list_recent(&self, owner: &OwnerId, limit: usize) -> Result<Vec<Entry>>;

    /// Entries with `from <= occurred_at < to`, earliest first.
    async fn list_between(
        &self,
        owner: &OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Entry>>;
}
