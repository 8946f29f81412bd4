//! Owner-scoped access to the habits and completions collections.
//!
//! Every read filters by `user_id` on the backend and again on the client,
//! and every write to an existing habit first checks that the acting user
//! owns it. Records owned by someone else are indistinguishable from records
//! that do not exist.
//!
//! Lists are read page by page until a short page comes back; the backend
//! otherwise stops at its default page size.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{unique_id, Backend, Query};
use crate::error::{CoreError, Result};
use crate::model::{Completion, Habit, HabitPatch, NewCompletion, NewHabit};
use crate::streak::DayWindow;

const OWNER_FIELD: &str = "user_id";

/// Documents requested per page when reading a whole list.
pub const PAGE_SIZE: u32 = 100;

/// Decode the documents owned by `user_id`. Documents that do not decode are
/// logged and skipped so one bad record does not hide the rest.
fn decode_owned<T>(docs: Vec<Value>, user_id: &str) -> Vec<T>
where
    T: serde::de::DeserializeOwned,
{
    docs.into_iter()
        .filter(|doc| doc.get(OWNER_FIELD).and_then(Value::as_str) == Some(user_id))
        .filter_map(|doc| {
            let id = doc
                .get("$id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match serde_json::from_value(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(document_id = %id, error = %e, "skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}

/// Every document in `collection` matching `queries`, across all pages.
async fn list_all(store: &dyn Backend, collection: &str, queries: &[Query]) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    let mut offset = 0u32;
    loop {
        let mut paged = queries.to_vec();
        paged.push(Query::limit(PAGE_SIZE));
        paged.push(Query::offset(offset));

        let page = store.list(collection, &paged).await?;
        let fetched = page.len() as u32;
        docs.extend(page);
        if fetched < PAGE_SIZE {
            return Ok(docs);
        }
        offset += fetched;
    }
}

pub struct HabitRepository {
    store: Arc<dyn Backend>,
    collection: String,
}

impl HabitRepository {
    pub fn new(store: Arc<dyn Backend>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Habits owned by `user_id`, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Habit>> {
        let docs = list_all(
            self.store.as_ref(),
            &self.collection,
            &[
                Query::equal(OWNER_FIELD, user_id),
                Query::order_desc("$createdAt"),
            ],
        )
        .await?;
        Ok(decode_owned(docs, user_id))
    }

    /// Fetch one habit, reporting [`CoreError::HabitNotFound`] for unknown ids
    /// and for habits owned by another user.
    pub async fn get(&self, user_id: &str, id: &str) -> Result<Habit> {
        let doc = match self.store.get(&self.collection, id).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => return Err(CoreError::HabitNotFound(id.to_string())),
            Err(e) => return Err(e),
        };
        let habit: Habit = serde_json::from_value(doc)?;
        if habit.user_id != user_id {
            debug!(habit_id = id, "habit belongs to another user");
            return Err(CoreError::HabitNotFound(id.to_string()));
        }
        Ok(habit)
    }

    pub async fn create(&self, user_id: &str, new: &NewHabit, now: DateTime<Utc>) -> Result<Habit> {
        new.validate()?;
        let doc = self
            .store
            .create(&self.collection, &unique_id(), new.to_document(user_id, now))
            .await?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Apply a user edit after checking ownership.
    pub async fn update(&self, user_id: &str, id: &str, patch: &HabitPatch) -> Result<Habit> {
        patch.validate()?;
        let current = self.get(user_id, id).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        self.write_patch(id, patch).await
    }

    /// Write `patch` without an ownership check. Callers must already hold
    /// the habit from [`HabitRepository::get`].
    pub(crate) async fn write_patch(&self, id: &str, patch: &HabitPatch) -> Result<Habit> {
        let data = serde_json::to_value(patch)?;
        match self.store.update(&self.collection, id, data).await {
            Ok(doc) => Ok(serde_json::from_value(doc)?),
            Err(e) if e.is_not_found() => Err(CoreError::HabitNotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Delete a habit. Its completions are left in place.
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        self.get(user_id, id).await?;
        match self.store.delete(&self.collection, id).await {
            Err(e) if e.is_not_found() => Err(CoreError::HabitNotFound(id.to_string())),
            other => other,
        }
    }
}

pub struct CompletionRepository {
    store: Arc<dyn Backend>,
    collection: String,
}

impl CompletionRepository {
    pub fn new(store: Arc<dyn Backend>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Completions by `user_id` at or after `since`, newest first.
    pub async fn list_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Completion>> {
        let docs = list_all(
            self.store.as_ref(),
            &self.collection,
            &[
                Query::equal(OWNER_FIELD, user_id),
                Query::since("completed_at", since),
                Query::order_desc("completed_at"),
            ],
        )
        .await?;
        Ok(decode_owned(docs, user_id))
    }

    /// Completions by `user_id` inside `window`, oldest first.
    pub async fn list_in(&self, user_id: &str, window: &DayWindow) -> Result<Vec<Completion>> {
        let docs = list_all(
            self.store.as_ref(),
            &self.collection,
            &[
                Query::equal(OWNER_FIELD, user_id),
                Query::since("completed_at", window.start),
                Query::before("completed_at", window.end),
                Query::order_asc("completed_at"),
            ],
        )
        .await?;
        let completions: Vec<Completion> = decode_owned(docs, user_id);
        Ok(completions
            .into_iter()
            .filter(|c| window.contains(c.completed_at))
            .collect())
    }

    /// Whether `user_id` has completed `habit_id` inside `window`.
    pub async fn exists_in(&self, user_id: &str, habit_id: &str, window: &DayWindow) -> Result<bool> {
        let docs = self
            .store
            .list(
                &self.collection,
                &[
                    Query::equal(OWNER_FIELD, user_id),
                    Query::equal("habit_id", habit_id),
                    Query::since("completed_at", window.start),
                    Query::before("completed_at", window.end),
                    Query::limit(1),
                ],
            )
            .await?;
        let found: Vec<Completion> = decode_owned(docs, user_id);
        Ok(found
            .iter()
            .any(|c| c.habit_id == habit_id && window.contains(c.completed_at)))
    }

    pub async fn create(&self, new: &NewCompletion) -> Result<Completion> {
        let data = serde_json::to_value(new)?;
        let doc = self
            .store
            .create(&self.collection, &unique_id(), data)
            .await?;
        Ok(serde_json::from_value(doc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthBackend, MemoryBackend};
    use crate::model::Frequency;
    use serde_json::json;

    async fn setup() -> (Arc<MemoryBackend>, HabitRepository, CompletionRepository) {
        let backend = Arc::new(MemoryBackend::new("db"));
        backend.add_account("ada@example.com", "password123");
        backend
            .create_session("ada@example.com", "password123")
            .await
            .unwrap();
        let habits = HabitRepository::new(backend.clone(), "habits");
        let completions = CompletionRepository::new(backend.clone(), "completions");
        (backend, habits, completions)
    }

    #[tokio::test]
    async fn test_list_never_returns_other_users_habits() {
        let (backend, habits, _) = setup().await;
        habits
            .create("alice", &NewHabit::new("Run", "5k", Frequency::Daily), Utc::now())
            .await
            .unwrap();
        backend.insert_raw(
            "habits",
            json!({"user_id": "bob", "title": "Swim", "description": "1k",
                   "frequency": "daily", "streak_count": 0,
                   "last_completed": "2026-10-16T00:00:00.000+00:00"}),
        );

        let listed = habits.list("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.iter().all(|h| h.user_id == "alice"));
        assert!(habits.list("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_habit_cannot_be_touched() {
        let (_, habits, _) = setup().await;
        let bobs = habits
            .create("bob", &NewHabit::new("Swim", "1k", Frequency::Weekly), Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            habits.get("alice", &bobs.id).await,
            Err(CoreError::HabitNotFound(_))
        ));
        let patch = HabitPatch {
            title: Some("Mine now".into()),
            ..Default::default()
        };
        assert!(habits.update("alice", &bobs.id, &patch).await.is_err());
        assert!(habits.delete("alice", &bobs.id).await.is_err());
        assert_eq!(habits.get("bob", &bobs.id).await.unwrap().title, "Swim");
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let (_, habits, _) = setup().await;
        let err = habits
            .create("alice", &NewHabit::new("", "x", Frequency::Daily), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let (_, habits, _) = setup().await;
        let habit = habits
            .create("alice", &NewHabit::new("Run", "5k", Frequency::Daily), Utc::now())
            .await
            .unwrap();
        let patch = HabitPatch {
            frequency: Some(Frequency::Monthly),
            ..Default::default()
        };
        let updated = habits.update("alice", &habit.id, &patch).await.unwrap();
        assert_eq!(updated.frequency, Frequency::Monthly);
        assert_eq!(updated.title, "Run");
        assert_eq!(updated.streak_count, 0);
    }

    #[tokio::test]
    async fn test_completions_window_and_owner() {
        let (_, _, completions) = setup().await;
        let now = Utc::now();
        let window = DayWindow::containing(&now);
        for (user, habit, at) in [
            ("alice", "h1", window.start),
            ("alice", "h2", window.start - chrono::Duration::milliseconds(1)),
            ("bob", "h3", window.start),
        ] {
            completions
                .create(&NewCompletion {
                    user_id: user.into(),
                    habit_id: habit.into(),
                    completed_at: at,
                })
                .await
                .unwrap();
        }

        let today = completions.list_in("alice", &window).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].habit_id, "h1");

        let since = completions
            .list_since("alice", window.start - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(since.len(), 2);
    }

    #[tokio::test]
    async fn test_list_reads_past_the_default_page() {
        let (_, habits, completions) = setup().await;
        let now = Utc::now();
        for n in 0..(PAGE_SIZE + 5) {
            habits
                .create("alice", &NewHabit::new(format!("Habit {n}"), "x", Frequency::Daily), now)
                .await
                .unwrap();
        }
        assert_eq!(habits.list("alice").await.unwrap().len(), (PAGE_SIZE + 5) as usize);

        let window = DayWindow::containing(&now);
        for n in 0..40 {
            completions
                .create(&NewCompletion {
                    user_id: "alice".into(),
                    habit_id: format!("h{n}"),
                    completed_at: window.start + chrono::Duration::seconds(n),
                })
                .await
                .unwrap();
        }
        let today = completions.list_in("alice", &window).await.unwrap();
        assert_eq!(today.len(), 40);
        assert_eq!(today[0].habit_id, "h0");
    }

    #[tokio::test]
    async fn test_exists_in_finds_early_completion_among_many() {
        let (_, _, completions) = setup().await;
        let window = DayWindow::containing(&Utc::now());
        for n in 0..30 {
            completions
                .create(&NewCompletion {
                    user_id: "alice".into(),
                    habit_id: if n == 0 { "target".into() } else { format!("other{n}") },
                    completed_at: window.start + chrono::Duration::minutes(n),
                })
                .await
                .unwrap();
        }

        assert!(completions.exists_in("alice", "target", &window).await.unwrap());
        assert!(!completions.exists_in("bob", "target", &window).await.unwrap());
        let yesterday = DayWindow::containing(&(window.start - chrono::Duration::hours(1)));
        assert!(!completions.exists_in("alice", "target", &yesterday).await.unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_documents_are_skipped() {
        let (backend, habits, _) = setup().await;
        habits
            .create("alice", &NewHabit::new("Run", "5k", Frequency::Daily), Utc::now())
            .await
            .unwrap();
        backend.insert_raw(
            "habits",
            json!({"user_id": "alice", "title": "Never done", "description": "x",
                   "frequency": "daily", "streak_count": 0, "last_completed": null}),
        );
        backend.insert_raw(
            "habits",
            json!({"user_id": "alice", "description": "no title", "frequency": "daily"}),
        );

        let listed = habits.list("alice").await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(listed.len(), 2);
        assert!(titles.contains(&"Never done"));
        assert!(listed.iter().any(|h| h.last_completed.is_none()));
    }
}
