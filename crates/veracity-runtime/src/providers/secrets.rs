//! Credential handling for model and search providers.
//!
//! API keys are wrapped in [`SecretString`] as soon as they are read, so
//! they never show up in `Debug`/`Display` output or tracing fields.
//!
//! ## Usage
//!
//! ```ignore
//! // Config option first, environment variable second
//! let cred =
//!     ApiCredential::from_config_or_env(&options, "api_key", "EXA_API_KEY", "Exa API key")?;
//!
//! // Explicit exposure at the point of use
//! request.header("x-api-key", cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

/// Errors from loading a credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("{name} required: set '{config_key}' in config or {env_var} environment variable")]
    Missing {
        name: &'static str,
        config_key: String,
        env_var: String,
    },

    #[error("{name} is empty")]
    Empty { name: &'static str },
}

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Provider options in the configuration file
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// An API key that cannot be printed by accident.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from `config[config_key]`, falling back to `env_var`.
    ///
    /// Blank values count as unset, so an empty config entry still falls
    /// back to the environment.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, CredentialError> {
        if let Some(value) = config_value(config, config_key) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => {
                Ok(Self::new(value, CredentialSource::Environment, name))
            }
            Ok(_) => Err(CredentialError::Empty { name }),
            Err(_) => Err(CredentialError::Missing {
                name,
                config_key: config_key.to_string(),
                env_var: env_var.to_string(),
            }),
        }
    }

    /// Whether a credential could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config_value(config, config_key).is_some()
            || std::env::var(env_var).is_ok_and(|v| !v.trim().is_empty())
    }

    /// Expose the value at the point of use. Never store the result.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Get the source of this credential.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Get the human-readable name of this credential.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn config_value<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Config, "Test API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));

        let display = format!("{}", cred);
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert_eq!(display, "Test API key from config [REDACTED]");
    }

    #[test]
    fn test_credential_expose() {
        let cred = ApiCredential::new("sk-1", CredentialSource::Programmatic, "Test API key");
        assert_eq!(cred.expose(), "sk-1");
        assert_eq!(cred.source(), CredentialSource::Programmatic);
    }

    #[test]
    fn test_from_config_or_env_prefers_config() {
        let config = serde_json::json!({"api_key": "config-key"});

        std::env::set_var("VERACITY_TEST_KEY_PRIORITY", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "VERACITY_TEST_KEY_PRIORITY",
            "Test key",
        )
        .unwrap();
        std::env::remove_var("VERACITY_TEST_KEY_PRIORITY");

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_blank_config_value_falls_back_to_env() {
        let config = serde_json::json!({"api_key": "  "});

        std::env::set_var("VERACITY_TEST_KEY_FALLBACK", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "VERACITY_TEST_KEY_FALLBACK",
            "Test key",
        )
        .unwrap();
        std::env::remove_var("VERACITY_TEST_KEY_FALLBACK");

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_missing_credential_names_both_sources() {
        let err = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "VERACITY_NONEXISTENT_VAR_12345",
            "Test key",
        )
        .unwrap_err();

        assert!(matches!(err, CredentialError::Missing { .. }));
        let msg = err.to_string();
        assert!(msg.contains("Test key"));
        assert!(msg.contains("api_key"));
        assert!(msg.contains("VERACITY_NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_is_available() {
        let config = serde_json::json!({"api_key": "value"});

        assert!(ApiCredential::is_available(&config, "api_key", "VERACITY_NONEXISTENT"));
        assert!(!ApiCredential::is_available(
            &serde_json::json!({"api_key": ""}),
            "api_key",
            "VERACITY_NONEXISTENT"
        ));
    }
}
