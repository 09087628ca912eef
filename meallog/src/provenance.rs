//! Record of entry ids that reached the engine through a real lookup.
//!
//! The mutation applier only accepts ids registered here. An id the oracle
//! produced on its own, however plausible, is rejected before any read or
//! write happens. Registration is the only test: repository ids are opaque,
//! so a registered id is accepted whatever its shape.

use crate::model::OwnerId;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// Ids shorter than this are unlikely to have been issued by a repository.
pub const MIN_ID_LEN: usize = 6;

/// Oldest ids are forgotten once an owner has this many registered.
pub const MAX_IDS_PER_OWNER: usize = 256;

lazy_static! {
    static ref PLACEHOLDER_ID: Regex = Regex::new(
        r"(?i)^(?:<[^>]*>|\{[^}]*\}|(?:entry|meal|id|target|example|sample|placeholder|unknown|none|null|undefined|todo|xxx+|abc+|test)[-_ ]?(?:id)?[-_ ]?\d*|0+|1234\d*|\.\.\.)$"
    )
    .unwrap();
}

/// True when `id` has the shape of something made up rather than assigned.
/// Only used to describe rejected ids; it never overrides registration.
pub fn looks_synthesized(id: &str) -> bool {
    let id = id.trim();
    id.chars().count() < MIN_ID_LEN || PLACEHOLDER_ID.is_match(id)
}

/// Ids registered for one owner, oldest first.
#[derive(Default)]
struct OwnerIds {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl OwnerIds {
    fn insert(&mut self, id: String) {
        if !self.set.insert(id.clone()) {
            // Refresh so a re-listed id is not the next one evicted.
            self.order.retain(|known| known != &id);
        }
        self.order.push_back(id);
        while self.order.len() > MAX_IDS_PER_OWNER {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
    }
}

#[derive(Default)]
pub struct IdProvenance {
    seen: RwLock<HashMap<OwnerId, OwnerIds>>,
}

impl IdProvenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register<I, S>(&self, owner: &OwnerId, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = self.seen.write().await;
        let known = seen.entry(owner.clone()).or_default();
        for id in ids {
            known.insert(id.into());
        }
        debug!("Provenance for {} now holds {} ids", owner, known.set.len());
    }

    pub async fn contains(&self, owner: &OwnerId, id: &str) -> bool {
        self.seen
            .read()
            .await
            .get(owner)
            .map_or(false, |known| known.set.contains(id))
    }

    /// Drops everything registered for `owner`.
    pub async fn forget(&self, owner: &OwnerId) {
        self.seen.write().await.remove(owner);
    }
}
