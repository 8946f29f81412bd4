//! Authenticated identity, passed explicitly to everything that needs it.
//!
//! Lifecycle: [`Session::new`] starts in [`AuthState::Pending`];
//! [`Session::init`] probes the backend for an existing session; sign-in and
//! sign-up establish an identity; [`Session::sign_out`] tears down every
//! realtime subscription opened through the session before the identity is
//! cleared. Dependents watch identity changes through [`Session::watch`].

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{CoreError, Result, ValidationError};
use crate::model::User;
use crate::realtime::{Subscription, SubscriptionHandle};

/// Client-side password minimum, checked before contacting the backend.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum AuthState {
    /// Not yet known; `init` has not finished.
    Pending,
    Anonymous,
    Authenticated(User),
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Check credentials the way the sign-in form does.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

pub struct Session {
    backend: Arc<dyn Backend>,
    state: watch::Sender<AuthState>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (state, _) = watch::channel(AuthState::Pending);
        Self {
            backend,
            state,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Ask the backend whether a session already exists. Any failure counts
    /// as "no session".
    pub async fn init(&self) -> AuthState {
        let next = match self.backend.current_user().await {
            Ok(Some(user)) => {
                debug!(user_id = %user.id, "restored existing session");
                AuthState::Authenticated(user)
            }
            Ok(None) => AuthState::Anonymous,
            Err(e) => {
                debug!(error = %e, "session probe failed, continuing anonymously");
                AuthState::Anonymous
            }
        };
        self.state.send_replace(next.clone());
        next
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every identity change.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::Pending)
    }

    /// The signed-in user, or [`CoreError::NotAuthenticated`].
    pub fn require_user(&self) -> Result<User> {
        self.user().ok_or(CoreError::NotAuthenticated)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        validate_credentials(email, password)?;
        if self.is_authenticated() {
            // Switching accounts: the old identity's feeds must not outlive it.
            self.cancel_subscriptions();
        }

        self.backend.create_session(email.trim(), password).await?;
        let user = self
            .backend
            .current_user()
            .await?
            .ok_or_else(|| CoreError::Auth("Session was not established".to_string()))?;

        info!(user_id = %user.id, "signed in");
        self.state.send_replace(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Create an account, then sign in with it.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        validate_credentials(email, password)?;
        let created = self.backend.create_account(email.trim(), password).await?;
        debug!(user_id = %created.id, "account created");
        self.sign_in(email, password).await
    }

    /// Cancel subscriptions, close the backend session, clear the identity.
    ///
    /// If the backend refuses, the identity is kept and the error returned;
    /// subscriptions stay cancelled either way.
    pub async fn sign_out(&self) -> Result<()> {
        self.cancel_subscriptions();
        self.backend.delete_session().await?;
        info!("signed out");
        self.state.send_replace(AuthState::Anonymous);
        Ok(())
    }

    /// Open a realtime subscription tied to this session's lifetime.
    pub async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription> {
        self.require_user()?;
        let subscription = self.backend.subscribe(channels).await?;
        debug!(channels = ?subscription.channels(), "realtime subscription opened");
        let mut subs = self.lock_subscriptions();
        subs.retain(|h| !h.is_cancelled());
        subs.push(subscription.handle());
        Ok(subscription)
    }

    /// Number of subscriptions opened through this session that are still live.
    pub fn active_subscriptions(&self) -> usize {
        self.lock_subscriptions()
            .iter()
            .filter(|h| !h.is_cancelled())
            .count()
    }

    fn cancel_subscriptions(&self) {
        let handles: Vec<SubscriptionHandle> = self.lock_subscriptions().drain(..).collect();
        if !handles.is_empty() {
            debug!(count = handles.len(), "cancelling realtime subscriptions");
        }
        for handle in handles {
            handle.cancel();
        }
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionHandle>> {
        self.subscriptions.lock().unwrap_or_else(|poisoned| {
            warn!("subscription registry lock poisoned");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthBackend, MemoryBackend};

    fn backend() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new("db"));
        backend.add_account("ada@example.com", "password123");
        backend
    }

    #[test]
    fn test_validate_credentials() {
        assert_eq!(
            validate_credentials("", "secret1"),
            Err(ValidationError::MissingCredentials)
        );
        assert_eq!(
            validate_credentials("a@b.c", "12345"),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        assert!(validate_credentials("a@b.c", "123456").is_ok());
    }

    #[tokio::test]
    async fn test_init_without_session_is_anonymous() {
        let session = Session::new(backend());
        assert!(session.is_loading());
        assert_eq!(session.init().await, AuthState::Anonymous);
        assert!(!session.is_loading());
        assert!(matches!(
            session.require_user(),
            Err(CoreError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_init_restores_existing_session() {
        let backend = backend();
        backend
            .create_session("ada@example.com", "password123")
            .await
            .unwrap();
        let session = Session::new(backend);
        assert!(matches!(session.init().await, AuthState::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_sign_in_notifies_watchers() {
        let session = Session::new(backend());
        session.init().await;
        let mut rx = session.watch();

        let user = session
            .sign_in("ada@example.com", "password123")
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().user(), Some(&user));
    }

    #[tokio::test]
    async fn test_short_password_never_reaches_backend() {
        let session = Session::new(backend());
        let err = session.sign_in("ada@example.com", "abc").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::PasswordTooShort { .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_up_signs_in() {
        let session = Session::new(backend());
        let user = session
            .sign_up("grace@example.com", "longenough")
            .await
            .unwrap();
        assert_eq!(session.user(), Some(user));
    }

    #[tokio::test]
    async fn test_sign_out_cancels_subscriptions_first() {
        let session = Session::new(backend());
        session
            .sign_in("ada@example.com", "password123")
            .await
            .unwrap();
        let mut sub = session
            .subscribe(vec!["documents".to_string()])
            .await
            .unwrap();
        assert_eq!(session.active_subscriptions(), 1);

        session.sign_out().await.unwrap();

        assert!(!sub.is_active());
        assert!(sub.recv().await.is_none());
        assert_eq!(session.active_subscriptions(), 0);
        assert_eq!(session.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_subscribe_requires_identity() {
        let session = Session::new(backend());
        session.init().await;
        let err = session.subscribe(vec!["documents".into()]).await.unwrap_err();
        assert!(matches!(err, CoreError::NotAuthenticated));
    }
}
