//! Core error types for habitrack-core.
//!
//! Every backend call funnels into [`CoreError`]. Front-ends never match on
//! transport details; they call [`CoreError::user_message`] and show the
//! result next to whatever control started the operation.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for habitrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Authentication rejected by the backend (bad credentials, weak password,
    /// expired session).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// An operation that needs a signed-in user ran without one.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Habit id unknown to the acting user.
    #[error("Habit not found: {0}")]
    HabitNotFound(String),

    /// Any other document that could not be found.
    #[error("Document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    /// Backend answered with a non-success status.
    #[error("Backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Transport failure before a response arrived.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Realtime channel failure.
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// OS keyring could not store or return the session.
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Unknown key passed to get/set
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home directory could not be determined
    #[error("Cannot determine the configuration directory")]
    NoConfigDir,
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email or password left empty
    #[error("Email and Password are required")]
    MissingCredentials,

    /// Password shorter than the backend minimum
    #[error("Password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    /// Required text field is blank
    #[error("'{field}' must not be empty")]
    EmptyField { field: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl CoreError {
    /// Message suitable for showing inline to the user.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Auth(message) => message.clone(),
            CoreError::NotAuthenticated => "You need to sign in first.".to_string(),
            CoreError::HabitNotFound(_) => "That habit no longer exists.".to_string(),
            CoreError::NotFound { .. } => "The requested record no longer exists.".to_string(),
            CoreError::Backend { message, .. } if !message.is_empty() => message.clone(),
            CoreError::Backend { status, .. } => {
                format!("The server returned an error (HTTP {status}).")
            }
            CoreError::Network(e) if e.is_timeout() => {
                "The server took too long to respond.".to_string()
            }
            CoreError::Network(_) => "Could not reach the server.".to_string(),
            CoreError::Realtime(_) => "Live updates are unavailable right now.".to_string(),
            CoreError::Validation(e) => e.to_string(),
            CoreError::Credentials(_) => {
                "Could not access the saved session; please sign in again.".to_string()
            }
            CoreError::Config(e) => e.to_string(),
            CoreError::Json(_) => "The server sent an unexpected response.".to_string(),
            CoreError::Io(e) => e.to_string(),
        }
    }

    /// Whether the backend reported the document as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::HabitNotFound(_)
                | CoreError::NotFound { .. }
                | CoreError::Backend { status: 404, .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CoreError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CoreError::Realtime(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_match_auth_screen() {
        assert_eq!(
            ValidationError::MissingCredentials.to_string(),
            "Email and Password are required"
        );
        assert_eq!(
            ValidationError::PasswordTooShort { min: 6 }.to_string(),
            "Password must be at least 6 characters long"
        );
    }

    #[test]
    fn test_user_message_prefers_backend_text() {
        let err = CoreError::Backend {
            status: 401,
            message: "Invalid credentials. Please check the email and password.".into(),
        };
        assert_eq!(
            err.user_message(),
            "Invalid credentials. Please check the email and password."
        );

        let bare = CoreError::Backend {
            status: 503,
            message: String::new(),
        };
        assert_eq!(bare.user_message(), "The server returned an error (HTTP 503).");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(CoreError::HabitNotFound("h1".into()).is_not_found());
        assert!(CoreError::Backend {
            status: 404,
            message: String::new()
        }
        .is_not_found());
        assert!(!CoreError::NotAuthenticated.is_not_found());
    }
}
