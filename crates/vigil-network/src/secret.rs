//! API key holder.

use std::fmt;
use vigil_core::error::CoreError;

/// Oracle API key. Kept in memory only; `Debug` never prints it.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Rejects blank keys.
    pub fn new(key: impl Into<String>) -> Result<Self, CoreError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(CoreError::Config("API key is empty".to_string()));
        }
        Ok(Self(key))
    }

    /// Reads the key from environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self, CoreError> {
        let value = std::env::var(var)
            .map_err(|_| CoreError::Config(format!("API key not set: export {var}")))?;
        Self::new(value).map_err(|_| CoreError::Config(format!("API key in {var} is empty")))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let key = ApiKey::new("sk-secret-value").unwrap();
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("secret"));
        assert_eq!(key.expose(), "sk-secret-value");
    }

    #[test]
    fn empty_key_rejected() {
        assert!(ApiKey::new("  ").is_err());
    }

    #[test]
    fn missing_env_is_config_error() {
        let err = ApiKey::from_env("VIGIL_TEST_DEFINITELY_UNSET_KEY").unwrap_err();
        assert!(matches!(err, CoreError::Config(ref m) if m.contains("VIGIL_TEST_DEFINITELY_UNSET_KEY")));
    }

    #[test]
    fn reads_env() {
        std::env::set_var("VIGIL_TEST_SECRET_KEY", " abc123 ");
        let key = ApiKey::from_env("VIGIL_TEST_SECRET_KEY").unwrap();
        assert_eq!(key.expose(), "abc123");
        std::env::remove_var("VIGIL_TEST_SECRET_KEY");
    }
}
