//! Backend-as-a-service collaborators.
//!
//! The client never stores anything itself: accounts, documents and change
//! notifications all come from the backend behind the traits in [`traits`].
//! [`appwrite::AppwriteClient`] talks to a real Appwrite server;
//! [`memory::MemoryBackend`] keeps everything in process for tests and demos.

pub mod appwrite;
pub mod memory;
pub mod query;
pub mod traits;

pub use appwrite::AppwriteClient;
pub use memory::MemoryBackend;
pub use query::Query;
pub use traits::{AuthBackend, Backend, DocumentStore, RealtimeChannel};

/// Fresh document id. Appwrite accepts up to 36 characters from
/// `[a-zA-Z0-9._-]`; a simple-format UUID is 32 hex digits.
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
