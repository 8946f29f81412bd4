//! Thin wrapper around the OS keyring for the persisted session.
//!
//! The session cookie blob returned by the backend is stored per project so
//! that switching projects does not reuse a foreign session.

use crate::error::{CoreError, Result};

const SERVICE: &str = "habitrack";

fn entry_key(project_id: &str) -> String {
    format!("session:{project_id}")
}

fn keyring_error(err: keyring::Error) -> CoreError {
    CoreError::Credentials(err.to_string())
}

pub fn load_session(project_id: &str) -> Result<Option<String>> {
    let entry = keyring::Entry::new(SERVICE, &entry_key(project_id)).map_err(keyring_error)?;
    match entry.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

pub fn store_session(project_id: &str, secret: &str) -> Result<()> {
    let entry = keyring::Entry::new(SERVICE, &entry_key(project_id)).map_err(keyring_error)?;
    entry.set_password(secret).map_err(keyring_error)
}

pub fn clear_session(project_id: &str) -> Result<()> {
    let entry = keyring::Entry::new(SERVICE, &entry_key(project_id)).map_err(keyring_error)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}
