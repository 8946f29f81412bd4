//! Wiring shared by every command that talks to the backend.

use habitrack_core::{credentials, AppwriteClient, Backend, Config, CoreError, HabitTracker, Session};
use std::sync::Arc;
use tracing::warn;

pub struct AppContext {
    pub config: Config,
    pub client: Arc<AppwriteClient>,
    pub session: Arc<Session>,
    pub tracker: Arc<HabitTracker>,
}

impl AppContext {
    /// Load config, restore the stored session and probe the backend.
    ///
    /// The backend config is validated before the keyring is touched.
    pub async fn connect() -> Result<Self, CoreError> {
        let config = Config::load()?;
        let client = Arc::new(AppwriteClient::new(config.backend.clone())?);

        match credentials::load_session(&config.backend.project_id) {
            Ok(secret) => client.set_session_secret(secret),
            Err(e) => warn!(error = %e, "stored session unavailable"),
        }

        let backend: Arc<dyn Backend> = client.clone();
        let session = Arc::new(Session::new(backend));
        session.init().await;
        let tracker = Arc::new(HabitTracker::new(
            session.clone(),
            config.backend.collections(),
        ));

        Ok(Self {
            config,
            client,
            session,
            tracker,
        })
    }

    /// Store the current session cookie, or clear it if there is none.
    pub fn persist_session(&self) -> Result<(), CoreError> {
        let project = &self.config.backend.project_id;
        match self.client.session_secret() {
            Some(secret) => credentials::store_session(project, &secret),
            None => credentials::clear_session(project),
        }
    }

    pub fn forget_session(&self) -> Result<(), CoreError> {
        self.client.set_session_secret(None);
        credentials::clear_session(&self.config.backend.project_id)
    }
}
