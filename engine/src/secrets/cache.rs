use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An in-memory cache for resolved secrets.
///
/// Provider clients hold one of these and resolve their key on first use,
/// so a process can start (and serve reads) before every key is configured.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    /// Creates a new SecretCache wrapping the provided SecretManager
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a cache pre-filled with fixed values, bypassing the manager.
    pub fn with_values(manager: Arc<SecretManager>, values: &[(&str, &str)]) -> Self {
        let cache = values
            .iter()
            .map(|(k, v)| (k.to_string(), SecretString::new(*v)))
            .collect();
        Self {
            manager,
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    /// Retrieves a secret, checking the memory cache first.
    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EngineError::KeyringError("SecretCache lock poisoned".into()))?;
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| EngineError::KeyringError("SecretCache lock poisoned".into()))?;
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Access to the underlying manager (for scrubbing)
    pub fn manager(&self) -> &SecretManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefilled_values_served_from_cache() {
        let manager = Arc::new(SecretManager::new("mindwell-test"));
        let cache = SecretCache::with_values(manager, &[("fixed_key", "fixed-value")]);

        let secret = cache.get_secret("fixed_key").unwrap();
        assert_eq!(secret.unsecure(), "fixed-value");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }
}
