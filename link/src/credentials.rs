//! Credential storage abstraction.
//!
//! The authentication record is kept in a simple persistent key-value slot.
//! Backends decide where the slot lives (memory, a file, a keychain, browser
//! storage); the client only needs `get`, `set` and `remove` by key.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Trait for credential storage backends.
///
/// Stores are shared between the session and the application, so all
/// methods take `&self`; implementations use interior mutability.
///
/// # Security Note
///
/// Values contain bearer tokens. File-backed implementations should restrict
/// permissions (0600 on Unix) and never log stored values.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use webpac_link::credentials::CredentialStore;
///
/// struct KeychainStore;
///
/// impl CredentialStore for KeychainStore {
///     fn get(&self, key: &str) -> webpac_link::Result<Option<String>> { Ok(None) }
///     fn set(&self, key: &str, value: &str) -> webpac_link::Result<()> { Ok(()) }
///     fn remove(&self, key: &str) -> webpac_link::Result<()> { Ok(()) }
/// }
/// ```
pub trait CredentialStore: Send + Sync {
    /// Returns `Ok(None)` if nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites any existing value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `Ok(())` even if nothing was stored.
    fn remove(&self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory credential store for tests and short-lived sessions.
///
/// # Example
///
/// ```rust
/// use webpac_link::credentials::{CredentialStore, MemoryCredentialStore};
///
/// let store = MemoryCredentialStore::new();
/// store.set("webpac.auth", "{}").unwrap();
/// assert_eq!(store.get("webpac.auth").unwrap().as_deref(), Some("{}"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
