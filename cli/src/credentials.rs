//! File-based credential storage for CLI
//!
//! Persists the gateway authentication record in TOML with secure file
//! permissions (0600 on Unix). Each gateway instance gets its own table, so
//! one file can hold logins for several gateways.
//!
//! # File Location
//!
//! - Windows: `~/.webpac/credentials.toml`
//! - Linux/macOS: `~/.config/webpac/credentials.toml`
//!
//! # File Format
//!
//! ```toml
//! [instances.local]
//! "webpac.auth" = '{"authenticated":true,"user":"operator",...}'
//!
//! [instances.line2]
//! "webpac.auth" = '{"authenticated":true,"user":"admin",...}'
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use webpac_link::credentials::CredentialStore;
use webpac_link::{Result, WebpacLinkError};

/// File-backed [`CredentialStore`] scoped to one gateway instance.
#[derive(Debug)]
pub struct FileCredentialStore {
    file_path: PathBuf,
    instance: String,
    /// Whole file, all instances
    cache: RwLock<CredentialsFile>,
}

/// Top-level TOML structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    instances: BTreeMap<String, BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Default credentials file path
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(".webpac").join("credentials.toml")
            } else {
                PathBuf::from(".webpac").join("credentials.toml")
            }
        }

        #[cfg(not(target_os = "windows"))]
        {
            if let Some(config_dir) = dirs::config_dir() {
                config_dir.join("webpac").join("credentials.toml")
            } else if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(".config").join("webpac").join("credentials.toml")
            } else {
                PathBuf::from(".webpac").join("credentials.toml")
            }
        }
    }

    /// Store for `instance` at the default location
    pub fn new(instance: impl Into<String>) -> Result<Self> {
        Self::with_path(Self::default_path(), instance)
    }

    /// Store for `instance` at a custom location
    pub fn with_path(file_path: PathBuf, instance: impl Into<String>) -> Result<Self> {
        let cache = Self::load_from_disk(&file_path)?;
        Ok(Self {
            file_path,
            instance: instance.into(),
            cache: RwLock::new(cache),
        })
    }

    fn load_from_disk(path: &Path) -> Result<CredentialsFile> {
        if !path.exists() {
            return Ok(CredentialsFile::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!(
                "Cannot read credentials file '{}': {}. Check its permissions or delete it and log in again.",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&contents).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!(
                "Corrupted credentials file '{}': {}. Delete it and log in again.",
                path.display(),
                e.message()
            ))
        })
    }

    fn save_to_disk(&self, file: &CredentialsFile) -> Result<()> {
        let contents = toml::to_string_pretty(file).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!("Failed to serialize credentials: {}", e))
        })?;

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                WebpacLinkError::ConfigurationError(format!(
                    "Failed to create credentials directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::write(&self.file_path, contents).map_err(|e| {
            WebpacLinkError::ConfigurationError(format!(
                "Failed to write credentials file at '{}': {}",
                self.file_path.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.file_path, permissions).map_err(|e| {
                WebpacLinkError::ConfigurationError(format!(
                    "Failed to set file permissions for '{}': {}",
                    self.file_path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Get the file path used by this store
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Instances with at least one stored value
    pub fn list_instances(&self) -> Vec<String> {
        self.cache
            .read()
            .instances
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .cache
            .read()
            .instances
            .get(&self.instance)
            .and_then(|values| values.get(key))
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.write();
        cache
            .instances
            .entry(self.instance.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save_to_disk(&cache)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.write();
        let removed = match cache.instances.get_mut(&self.instance) {
            Some(values) => values.remove(key).is_some(),
            None => false,
        };
        if !removed {
            return Ok(());
        }
        if cache
            .instances
            .get(&self.instance)
            .is_some_and(|values| values.is_empty())
        {
            cache.instances.remove(&self.instance);
        }
        self.save_to_disk(&cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use webpac_link::AUTH_RECORD_KEY;

    fn create_temp_store(instance: &str) -> (FileCredentialStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("credentials.toml");
        let store = FileCredentialStore::with_path(file_path, instance).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_file_store_basic_operations() {
        let (store, _temp_dir) = create_temp_store("local");

        assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
        assert!(!store.contains(AUTH_RECORD_KEY).unwrap());

        store.set(AUTH_RECORD_KEY, "{\"token\":\"t\"}").unwrap();
        assert_eq!(
            store.get(AUTH_RECORD_KEY).unwrap().as_deref(),
            Some("{\"token\":\"t\"}")
        );

        store.remove(AUTH_RECORD_KEY).unwrap();
        assert_eq!(store.get(AUTH_RECORD_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("config").join("credentials.toml");

        {
            let store = FileCredentialStore::with_path(file_path.clone(), "line2").unwrap();
            store.set(AUTH_RECORD_KEY, "record-line2").unwrap();
        }

        assert!(file_path.exists());

        let store = FileCredentialStore::with_path(file_path, "line2").unwrap();
        assert_eq!(
            store.get(AUTH_RECORD_KEY).unwrap().as_deref(),
            Some("record-line2")
        );
    }

    #[test]
    fn test_instances_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("credentials.toml");

        let local = FileCredentialStore::with_path(file_path.clone(), "local").unwrap();
        local.set(AUTH_RECORD_KEY, "a").unwrap();

        let other = FileCredentialStore::with_path(file_path.clone(), "prod").unwrap();
        assert_eq!(other.get(AUTH_RECORD_KEY).unwrap(), None);
        other.set(AUTH_RECORD_KEY, "b").unwrap();

        let reloaded = FileCredentialStore::with_path(file_path, "local").unwrap();
        assert_eq!(reloaded.get(AUTH_RECORD_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(reloaded.list_instances(), vec!["local", "prod"]);
    }

    #[test]
    fn test_remove_drops_empty_instance_table() {
        let (store, _temp_dir) = create_temp_store("local");
        store.set(AUTH_RECORD_KEY, "x").unwrap();
        store.remove(AUTH_RECORD_KEY).unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(!contents.contains("[instances.local]"));
        assert!(store.list_instances().is_empty());
    }

    #[test]
    fn test_remove_missing_key_does_not_create_file() {
        let (store, _temp_dir) = create_temp_store("local");
        store.remove(AUTH_RECORD_KEY).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp_dir) = create_temp_store("local");
        store.set(AUTH_RECORD_KEY, "secret-record").unwrap();

        let metadata = fs::metadata(store.path()).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_toml_format() {
        let (store, _temp_dir) = create_temp_store("local");
        store.set(AUTH_RECORD_KEY, "{\"user\":\"operator\"}").unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(contents.contains("[instances.local]"));
        assert!(contents.contains("webpac.auth"));
        assert!(contents.contains("operator"));
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("credentials.toml");
        fs::write(&file_path, "[instances.local\n").unwrap();

        let err = FileCredentialStore::with_path(file_path, "local").unwrap_err();
        assert!(err.to_string().contains("Corrupted credentials file"));
    }
}
