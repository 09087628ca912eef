use super::EntryRepository;
use crate::error::{MealLogError, Result};
use crate::model::{Entry, EntryDraft, OwnerId};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite-backed entry repository. Entries are stored as JSON payloads with
/// the ordering columns broken out for indexed queries.
#[derive(Debug)]
pub struct SqliteEntryRepository {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteEntryRepository {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let db_path = path.into();
        let conn = Connection::open(&db_path)?;
        Self::init(conn, db_path)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute_batch(
            "BEGIN;CREATE TABLE IF NOT EXISTS entries(
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );CREATE INDEX IF NOT EXISTS idx_entries_owner_created ON entries(owner_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_entries_owner_occurred ON entries(owner_id, occurred_at);COMMIT;",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MealLogError::StoreUnavailable("connection lock poisoned".to_string()))
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width so lexical order matches chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode(payload: &str) -> Result<Entry> {
    serde_json::from_str(payload)
        .map_err(|e| MealLogError::StoreUnavailable(format!("corrupt entry payload: {}", e)))
}

fn encode(entry: &Entry) -> Result<String> {
    serde_json::to_string(entry)
        .map_err(|e| MealLogError::StoreUnavailable(format!("failed to encode entry: {}", e)))
}

#[async_trait]
impl EntryRepository for SqliteEntryRepository {
    async fn create(&self, owner: &OwnerId, draft: EntryDraft) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let entry = draft.into_entry(id.clone(), Utc::now());
        let payload = encode(&entry)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entries(id, owner_id, created_at, occurred_at, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                owner.as_str(),
                timestamp(&entry.created_at),
                timestamp(&entry.occurred_at),
                payload
            ],
        )?;
        Ok(id)
    }

    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<Entry>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM entries WHERE owner_id = ?1 AND id = ?2",
                params![owner.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        payload.as_deref().map(decode).transpose()
    }

    async fn update(&self, owner: &OwnerId, id: &str, entry: &Entry) -> Result<()> {
        let conn = self.lock()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT payload FROM entries WHERE owner_id = ?1 AND id = ?2",
                params![owner.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let stored = match stored {
            Some(p) => decode(&p)?,
            None => return Err(MealLogError::EntryNotFound(id.to_string())),
        };

        let mut replacement = entry.clone();
        replacement.id = id.to_string();
        replacement.created_at = stored.created_at;
        let payload = encode(&replacement)?;

        conn.execute(
            "UPDATE entries SET occurred_at = ?1, payload = ?2 WHERE owner_id = ?3 AND id = ?4",
            params![
                timestamp(&replacement.occurred_at),
                payload,
                owner.as_str(),
                id
            ],
        )?;
        Ok(())
    }

    async fn list_recent(&self, owner: &OwnerId, limit: usize) -> Result<Vec<Entry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM entries WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![owner.as_str(), limit as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(&row?)?);
        }
        Ok(out)
    }

    async fn list_between(
        &self,
        owner: &OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Entry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM entries WHERE owner_id = ?1 AND occurred_at >= ?2 AND occurred_at < ?3 ORDER BY occurred_at ASC",
        )?;
        let rows = stmt.query_map(
            params![owner.as_str(), timestamp(&from), timestamp(&to)],
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(&row?)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, MealCategory, Nutrients};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn draft(category: MealCategory, calories: f64) -> EntryDraft {
        EntryDraft::new(
            category,
            vec![Component::new("item", "1", Nutrients::new(calories, 1.0, 2.0, 3.0))],
        )
    }

    #[tokio::test]
    async fn round_trips_entries_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.sqlite");
        let owner = OwnerId::new("alice");

        let id = {
            let repo = SqliteEntryRepository::open(&path).unwrap();
            repo.create(&owner, draft(MealCategory::Dinner, 640.0))
                .await
                .unwrap()
        };

        let repo = SqliteEntryRepository::open(&path).unwrap();
        let entry = repo.get(&owner, &id).await.unwrap().unwrap();
        assert_eq!(entry.category, MealCategory::Dinner);
        assert_eq!(entry.aggregates().calories, 640.0);
        assert!(repo.get(&OwnerId::new("bob"), &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_recent_orders_by_creation() {
        let repo = SqliteEntryRepository::in_memory().unwrap();
        let owner = OwnerId::new("alice");
        let a = repo.create(&owner, draft(MealCategory::Breakfast, 1.0)).await.unwrap();
        let b = repo.create(&owner, draft(MealCategory::Lunch, 2.0)).await.unwrap();
        let c = repo.create(&owner, draft(MealCategory::Dinner, 3.0)).await.unwrap();

        let ids: Vec<_> = repo
            .list_recent(&owner, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![c, b, a]);
    }

    #[tokio::test]
    async fn update_missing_entry_is_not_found() {
        let repo = SqliteEntryRepository::in_memory().unwrap();
        let owner = OwnerId::new("alice");
        let id = repo.create(&owner, draft(MealCategory::Snack, 100.0)).await.unwrap();
        let entry = repo.get(&owner, &id).await.unwrap().unwrap();

        let err = repo.update(&owner, "missing-id", &entry).await.unwrap_err();
        assert!(matches!(err, MealLogError::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn list_between_filters_on_occurrence_time() {
        let repo = SqliteEntryRepository::in_memory().unwrap();
        let owner = OwnerId::new("alice");
        let day = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();

        repo.create(
            &owner,
            draft(MealCategory::Breakfast, 300.0).with_occurred_at(day + Duration::hours(8)),
        )
        .await
        .unwrap();
        repo.create(
            &owner,
            draft(MealCategory::Dinner, 700.0).with_occurred_at(day + Duration::hours(19)),
        )
        .await
        .unwrap();
        repo.create(
            &owner,
            draft(MealCategory::Snack, 150.0).with_occurred_at(day - Duration::hours(2)),
        )
        .await
        .unwrap();

        let entries = repo
            .list_between(&owner, day, day + Duration::days(1))
            .await
            .unwrap();
        let categories: Vec<_> = entries.iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![MealCategory::Breakfast, MealCategory::Dinner]);
    }
}
