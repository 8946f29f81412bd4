//! In-process backend for testing and offline use.
//!
//! Behaves like a single Appwrite project with one database: accounts with a
//! single current session, document collections that require a session, and
//! realtime pushes for every document mutation.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

use super::query::{apply_queries, Query};
use super::traits::{AuthBackend, DocumentStore, RealtimeChannel};
use super::unique_id;
use crate::error::{CoreError, Result};
use crate::model::User;
use crate::realtime::{RealtimeMessage, Subscription, SUBSCRIPTION_BUFFER};

const MIN_BACKEND_PASSWORD: usize = 8;

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<Account>,
    current: Option<String>,
    collections: HashMap<String, Vec<Value>>,
    failing_updates: HashSet<String>,
    failing_creates: HashSet<String>,
}

/// In-memory backend.
pub struct MemoryBackend {
    database_id: String,
    state: Mutex<MemoryState>,
    events: broadcast::Sender<RealtimeMessage>,
}

impl MemoryBackend {
    pub fn new(database_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            database_id: database_id.into(),
            state: Mutex::new(MemoryState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an account without going through `create_account`.
    pub fn add_account(&self, email: &str, password: &str) -> User {
        let user = User {
            id: unique_id(),
            email: email.to_string(),
            name: String::new(),
        };
        self.state().accounts.push(Account {
            user: user.clone(),
            password: password.to_string(),
        });
        user
    }

    /// Make every update in `collection` fail with a 503 until switched off.
    pub fn set_fail_updates(&self, collection: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_updates.insert(collection.to_string());
        } else {
            state.failing_updates.remove(collection);
        }
    }

    /// Make every create in `collection` fail with a 503 until switched off.
    pub fn set_fail_creates(&self, collection: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_creates.insert(collection.to_string());
        } else {
            state.failing_creates.remove(collection);
        }
    }

    /// Raw contents of `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.state()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Store a document as-is, bypassing sessions and notifications.
    pub fn insert_raw(&self, collection: &str, mut doc: Value) -> Value {
        let now = timestamp();
        if let Some(obj) = doc.as_object_mut() {
            obj.entry("$id").or_insert_with(|| Value::String(unique_id()));
            obj.entry("$createdAt").or_insert_with(|| Value::String(now.clone()));
            obj.entry("$updatedAt").or_insert_with(|| Value::String(now));
        }
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        doc
    }

    fn require_session(state: &MemoryState) -> Result<()> {
        if state.current.is_none() {
            return Err(CoreError::Backend {
                status: 401,
                message: "The current user is not authorized to perform the requested action."
                    .to_string(),
            });
        }
        Ok(())
    }

    fn publish(&self, collection: &str, doc: &Value, action: &str) {
        let doc_id = doc["$id"].as_str().unwrap_or_default();
        let db = &self.database_id;
        let message = RealtimeMessage {
            events: vec![
                format!("databases.{db}.collections.{collection}.documents.{doc_id}.{action}"),
                format!("databases.*.collections.*.documents.*.{action}"),
                format!("databases.{db}.collections.{collection}.documents.{doc_id}"),
                "databases.*.collections.*.documents.*".to_string(),
            ],
            channels: vec![
                "documents".to_string(),
                format!("databases.{db}.collections.{collection}.documents"),
                format!("databases.{db}.collections.{collection}.documents.{doc_id}"),
            ],
            timestamp: Value::String(timestamp()),
            payload: doc.clone(),
        };
        // No receivers is fine.
        let _ = self.events.send(message);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("default")
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

fn unavailable() -> CoreError {
    CoreError::Backend {
        status: 503,
        message: "Service unavailable".to_string(),
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn create_session(&self, email: &str, password: &str) -> Result<()> {
        let mut state = self.state();
        let user_id = state
            .accounts
            .iter()
            .find(|a| a.user.email.eq_ignore_ascii_case(email) && a.password == password)
            .map(|a| a.user.id.clone())
            .ok_or_else(|| {
                CoreError::Auth(
                    "Invalid credentials. Please check the email and password.".to_string(),
                )
            })?;
        state.current = Some(user_id);
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        let state = self.state();
        Ok(state.current.as_ref().and_then(|id| {
            state
                .accounts
                .iter()
                .find(|a| &a.user.id == id)
                .map(|a| a.user.clone())
        }))
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<User> {
        if !email.contains('@') {
            return Err(CoreError::Backend {
                status: 400,
                message: "Invalid `email` param: Value must be a valid email address".to_string(),
            });
        }
        if password.chars().count() < MIN_BACKEND_PASSWORD {
            return Err(CoreError::Auth(format!(
                "Invalid `password` param: Password must be at least {MIN_BACKEND_PASSWORD} characters"
            )));
        }
        if self
            .state()
            .accounts
            .iter()
            .any(|a| a.user.email.eq_ignore_ascii_case(email))
        {
            return Err(CoreError::Backend {
                status: 409,
                message: "A user with the same id, email, or phone already exists in this project."
                    .to_string(),
            });
        }
        Ok(self.add_account(email, password))
    }

    async fn delete_session(&self) -> Result<()> {
        let mut state = self.state();
        Self::require_session(&state)?;
        state.current = None;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn list(&self, collection: &str, queries: &[Query]) -> Result<Vec<Value>> {
        let state = self.state();
        Self::require_session(&state)?;
        let docs = state.collections.get(collection).cloned().unwrap_or_default();
        Ok(apply_queries(docs, queries))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value> {
        let state = self.state();
        Self::require_session(&state)?;
        state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d["$id"] == id))
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Value> {
        let doc = {
            let mut state = self.state();
            Self::require_session(&state)?;
            if state.failing_creates.contains(collection) {
                return Err(unavailable());
            }
            let Value::Object(mut attrs) = data else {
                return Err(CoreError::Backend {
                    status: 400,
                    message: "Invalid document structure: expected an object".to_string(),
                });
            };
            let docs = state.collections.entry(collection.to_string()).or_default();
            if docs.iter().any(|d| d["$id"] == id) {
                return Err(CoreError::Backend {
                    status: 409,
                    message: "Document with the requested ID already exists.".to_string(),
                });
            }
            let now = timestamp();
            attrs.insert("$id".into(), json!(id));
            attrs.insert("$collectionId".into(), json!(collection));
            attrs.insert("$databaseId".into(), json!(self.database_id));
            attrs.insert("$createdAt".into(), json!(now));
            attrs.insert("$updatedAt".into(), json!(now));
            let doc = Value::Object(attrs);
            docs.push(doc.clone());
            doc
        };
        self.publish(collection, &doc, "create");
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value> {
        let doc = {
            let mut state = self.state();
            Self::require_session(&state)?;
            if state.failing_updates.contains(collection) {
                return Err(unavailable());
            }
            let stored = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| d["$id"] == id))
                .ok_or_else(|| CoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            if let (Some(target), Value::Object(patch)) = (stored.as_object_mut(), data) {
                for (key, value) in patch {
                    if !key.starts_with('$') {
                        target.insert(key, value);
                    }
                }
                target.insert("$updatedAt".into(), json!(timestamp()));
            }
            stored.clone()
        };
        self.publish(collection, &doc, "update");
        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let doc = {
            let mut state = self.state();
            Self::require_session(&state)?;
            let docs = state.collections.get_mut(collection);
            let pos = docs
                .as_ref()
                .and_then(|docs| docs.iter().position(|d| d["$id"] == id));
            match (docs, pos) {
                (Some(docs), Some(pos)) => docs.remove(pos),
                _ => {
                    return Err(CoreError::NotFound {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    })
                }
            }
        };
        self.publish(collection, &doc, "delete");
        Ok(())
    }
}

#[async_trait]
impl RealtimeChannel for MemoryBackend {
    async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription> {
        let mut feed = self.events.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let wanted = channels.clone();

        let task = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(msg) => {
                        if !msg.channels.iter().any(|c| wanted.contains(c)) {
                            continue;
                        }
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "realtime subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(channels, rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn signed_in() -> (MemoryBackend, User) {
        let backend = MemoryBackend::new("db");
        let user = backend.add_account("ada@example.com", "password123");
        backend
            .create_session("ada@example.com", "password123")
            .await
            .unwrap();
        (backend, user)
    }

    #[tokio::test]
    async fn test_documents_require_session() {
        let backend = MemoryBackend::new("db");
        let err = backend.list("habits", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::Backend { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_wrong_password_is_auth_error() {
        let backend = MemoryBackend::new("db");
        backend.add_account("ada@example.com", "password123");
        let err = backend
            .create_session("ada@example.com", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Auth(_)));
        assert!(backend.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let backend = MemoryBackend::new("db");
        backend
            .create_account("ada@example.com", "password123")
            .await
            .unwrap();
        let err = backend
            .create_account("ADA@example.com", "password456")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Backend { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_update_merges_attributes() {
        let (backend, _) = signed_in().await;
        backend
            .create("habits", "h1", json!({"title": "Run", "streak_count": 1}))
            .await
            .unwrap();
        let updated = backend
            .update("habits", "h1", json!({"streak_count": 2, "$id": "evil"}))
            .await
            .unwrap();
        assert_eq!(updated["title"], "Run");
        assert_eq!(updated["streak_count"], 2);
        assert_eq!(updated["$id"], "h1");
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let (backend, _) = signed_in().await;
        let err = backend.delete("habits", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_subscription_filters_channels() {
        let (backend, _) = signed_in().await;
        let mut sub = backend
            .subscribe(vec!["databases.db.collections.completions.documents".into()])
            .await
            .unwrap();

        backend.create("habits", "h1", json!({"title": "Run"})).await.unwrap();
        backend
            .create("completions", "c1", json!({"habit_id": "h1"}))
            .await
            .unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.payload["$id"], "c1");
        assert!(msg
            .events
            .contains(&"databases.db.collections.completions.documents.c1.create".to_string()));
    }
}
