//! Core traits for backend collaborators.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::User;
use crate::realtime::Subscription;

use super::query::Query;

/// Account and session management.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Open a session with email and password.
    async fn create_session(&self, email: &str, password: &str) -> Result<()>;

    /// The account behind the current session, or `None` without one.
    async fn current_user(&self) -> Result<Option<User>>;

    /// Register a new account. Does not sign in.
    async fn create_account(&self, email: &str, password: &str) -> Result<User>;

    /// Close the current session.
    async fn delete_session(&self) -> Result<()>;
}

/// Document collections inside one database.
///
/// Documents are JSON objects carrying the backend's `$id`, `$createdAt` and
/// `$updatedAt` fields next to their attributes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, collection: &str, queries: &[Query]) -> Result<Vec<Value>>;

    /// Fails with [`crate::CoreError::NotFound`] for unknown ids.
    async fn get(&self, collection: &str, id: &str) -> Result<Value>;

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Value>;

    /// Merge `data` into the stored document.
    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// Push channel for change notifications.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription>;
}

/// Everything the client needs from one backend.
pub trait Backend: AuthBackend + DocumentStore + RealtimeChannel {}

impl<T: AuthBackend + DocumentStore + RealtimeChannel> Backend for T {}
