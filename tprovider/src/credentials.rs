//! In-memory API key storage keyed by provider configuration id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::ProviderError;

#[derive(PartialEq, Eq)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        self.value.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        // SAFETY: zero bytes are valid UTF-8.
        unsafe {
            self.value.as_mut_vec().fill(0);
        }
    }
}

#[derive(Default)]
pub struct SecureCredentialManager {
    api_keys: Mutex<HashMap<String, SecretString>>,
}

impl SecureCredentialManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_api_key(
        &self,
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<(), ProviderError> {
        let api_key = SecretString::new(api_key);
        if api_key.is_empty() {
            return Err(ProviderError::authentication("api key must not be empty"));
        }

        self.keys()?.insert(provider_id.into(), api_key);
        Ok(())
    }

    pub fn has_credentials(&self, provider_id: &str) -> Result<bool, ProviderError> {
        Ok(self.keys()?.contains_key(provider_id))
    }

    pub fn api_key(&self, provider_id: &str) -> Result<Option<SecretString>, ProviderError> {
        Ok(self.keys()?.get(provider_id).cloned())
    }

    pub fn with_api_key<R>(
        &self,
        provider_id: &str,
        f: impl FnOnce(&str) -> R,
    ) -> Result<Option<R>, ProviderError> {
        Ok(self.keys()?.get(provider_id).map(|secret| f(secret.expose())))
    }

    pub fn clear(&self, provider_id: &str) -> Result<bool, ProviderError> {
        Ok(self.keys()?.remove(provider_id).is_some())
    }

    fn keys(&self) -> Result<MutexGuard<'_, HashMap<String, SecretString>>, ProviderError> {
        self.api_keys
            .lock()
            .map_err(|_| ProviderError::other("credential manager lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let secret = SecretString::new("sk-live");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
    }

    #[test]
    fn api_keys_are_scoped_per_provider_id() {
        let manager = SecureCredentialManager::new();
        manager
            .set_api_key("work-openai", "sk-1")
            .expect("key should set");

        assert!(manager.has_credentials("work-openai").expect("lock"));
        assert!(!manager.has_credentials("home-openai").expect("lock"));
        assert_eq!(
            manager
                .with_api_key("work-openai", |key| key.len())
                .expect("lock"),
            Some(4)
        );
        assert!(manager.set_api_key("x", "  ").is_err());
        assert!(manager.clear("work-openai").expect("lock"));
    }
}
