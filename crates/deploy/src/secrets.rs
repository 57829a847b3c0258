//! Secret lookup for network credentials and secret-backed endpoint URLs.

use std::{collections::HashMap, fmt};

/// Capability to look up a named secret at call time.
///
/// Lookups are never cached by the pipeline, so rotating a secret between two
/// deployments takes effect on the next call.
pub trait SecretProvider: Send + Sync {
    /// Returns the secret value, or `None` if it is not set.
    fn resolve_secret(&self, name: &str) -> Option<String>;
}

/// Reads secrets from process environment variables.
///
/// Empty values are treated as unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretProvider for EnvSecrets {
    fn resolve_secret(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// In-memory secret store.
#[derive(Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret, returning the updated store.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }
}

impl fmt::Debug for StaticSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSecrets")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretProvider for StaticSecrets {
    fn resolve_secret(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// A resolved secret value. Formatting never reveals the content.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Never pass the result to a log statement.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("0xdeadbeef");
        assert_eq!(format!("{:?}", secret), "Secret(<redacted>)");
        assert_eq!(secret.to_string(), "<redacted>");
        assert_eq!(secret.expose(), "0xdeadbeef");
    }

    #[test]
    fn test_static_secrets_lookup() {
        let mut secrets = StaticSecrets::new().with("COTI_PRIVATE_KEY", "0x01");
        assert_eq!(
            secrets.resolve_secret("COTI_PRIVATE_KEY").as_deref(),
            Some("0x01")
        );
        assert!(secrets.resolve_secret("SEPOLIA_PRIVATE_KEY").is_none());

        secrets.remove("COTI_PRIVATE_KEY");
        assert!(secrets.resolve_secret("COTI_PRIVATE_KEY").is_none());
    }

    #[test]
    fn test_static_secrets_debug_hides_values() {
        let secrets = StaticSecrets::new().with("KEY", "super-secret");
        assert!(!format!("{:?}", secrets).contains("super-secret"));
    }

    #[test]
    fn test_env_secrets_missing_var() {
        assert!(
            EnvSecrets
                .resolve_secret("SOLIVRE_TEST_SURELY_UNSET_SECRET_VAR")
                .is_none()
        );
    }
}
