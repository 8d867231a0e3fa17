//! Provider configuration.
//!
//! The orchestrator passes the provider block as JSON. Anything left unset
//! falls back to the usual `CLOUDFLARE_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

const ENV_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
const ENV_EMAIL: &str = "CLOUDFLARE_EMAIL";
const ENV_API_KEY: &str = "CLOUDFLARE_API_KEY";
const ENV_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";
const ENV_BASE_URL: &str = "CLOUDFLARE_BASE_URL";

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A scoped API token, sent as a bearer token.
    Token(String),
    /// A global API key with the account email.
    Key {
        /// Account email.
        email: String,
        /// Global API key.
        key: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::Key { email, .. } => f
                .debug_struct("Key")
                .field("email", email)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// Provider configuration block.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Scoped API token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Account email, used with `api_key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Global API key, used with `email`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Account that owns the prefixes.
    pub account_id: String,
    /// API endpoint; [`DEFAULT_BASE_URL`] when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Log request and response bodies at debug level.
    pub api_client_logging: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            email: None,
            api_key: None,
            account_id: String::new(),
            base_url: None,
            api_client_logging: false,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("api_client_logging", &self.api_client_logging)
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Cloudflare API access")
            .with_attribute(
                "api_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Scoped API token. Conflicts with api_key."),
            )
            .with_attribute(
                "email",
                Attribute::optional_string().with_description("Account email for api_key"),
            )
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Global API key. Requires email."),
            )
            .with_attribute(
                "account_id",
                Attribute::optional_string()
                    .with_description("Account owning the prefixes (or CLOUDFLARE_ACCOUNT_ID)"),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string()
                    .with_default(serde_json::Value::String(DEFAULT_BASE_URL.to_string())),
            )
            .with_attribute(
                "api_client_logging",
                Attribute::optional_bool()
                    .with_default(serde_json::Value::Bool(false))
                    .with_description("Log API request and response bodies at debug level"),
            )
    }

    /// Parse the provider block and fill gaps from the process environment.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(value, |name| std::env::var(name).ok())
    }

    /// Parse the provider block and fill gaps using `lookup`.
    pub fn from_value_with_env<F>(
        value: serde_json::Value,
        lookup: F,
    ) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_json::from_value(value)?
        };
        Ok(config.with_env_fallback(lookup))
    }

    /// Fill unset fields using `lookup` for environment variables.
    pub fn with_env_fallback<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if is_blank(&self.api_token) {
            self.api_token = lookup(ENV_API_TOKEN);
        }
        if is_blank(&self.email) {
            self.email = lookup(ENV_EMAIL);
        }
        if is_blank(&self.api_key) {
            self.api_key = lookup(ENV_API_KEY);
        }
        if self.account_id.is_empty() {
            self.account_id = lookup(ENV_ACCOUNT_ID).unwrap_or_default();
        }
        if is_blank(&self.base_url) {
            self.base_url = lookup(ENV_BASE_URL);
        }
        self
    }

    /// The endpoint requests go to.
    pub fn base_url(&self) -> &str {
        non_blank(&self.base_url).unwrap_or(DEFAULT_BASE_URL)
    }

    /// Resolve the authentication scheme.
    ///
    /// Exactly one of `api_token` or `email` + `api_key` must be set.
    pub fn credentials(&self) -> Result<Credentials, ProviderError> {
        let token = non_blank(&self.api_token);
        let email = non_blank(&self.email);
        let key = non_blank(&self.api_key);

        match (token, email, key) {
            (Some(_), _, Some(_)) => Err(ProviderError::Configuration(
                "api_token and api_key are mutually exclusive".to_string(),
            )),
            (Some(token), _, None) => Ok(Credentials::Token(token.to_string())),
            (None, Some(email), Some(key)) => Ok(Credentials::Key {
                email: email.to_string(),
                key: key.to_string(),
            }),
            (None, None, Some(_)) => Err(ProviderError::Configuration(
                "api_key requires email".to_string(),
            )),
            (None, _, None) => Err(ProviderError::Configuration(
                "one of api_token or email + api_key must be set".to_string(),
            )),
        }
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ProviderError> {
        self.credentials()?;
        if self.account_id.is_empty() {
            return Err(ProviderError::Configuration(
                "account_id must be set".to_string(),
            ));
        }
        let base_url = self.base_url();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ProviderError::Configuration(format!(
                "base_url must be an http(s) URL, got \"{}\"",
                base_url
            )));
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    non_blank(value).is_none()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn parse(value: serde_json::Value) -> ProviderConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(json!({}));
        assert!(config.base_url.is_none());
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert!(!config.api_client_logging);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_token_credentials() {
        let config = parse(json!({"api_token": "t", "account_id": "a"}));
        assert_eq!(config.credentials().unwrap(), Credentials::Token("t".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_credentials() {
        let config = parse(json!({"email": "ops@example.com", "api_key": "k", "account_id": "a"}));
        assert_eq!(
            config.credentials().unwrap(),
            Credentials::Key {
                email: "ops@example.com".to_string(),
                key: "k".to_string()
            }
        );
    }

    #[test]
    fn test_conflicting_credentials() {
        let config = parse(json!({"api_token": "t", "email": "e", "api_key": "k"}));
        let err = config.credentials().unwrap_err();
        assert!(err.message().contains("mutually exclusive"));
    }

    #[test]
    fn test_missing_credentials() {
        let err = parse(json!({"account_id": "a"})).credentials().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        let err = parse(json!({"api_key": "k"})).credentials().unwrap_err();
        assert!(err.message().contains("requires email"));
    }

    #[test]
    fn test_validate_requires_account() {
        let config = parse(json!({"api_token": "t"}));
        assert!(config.validate().unwrap_err().message().contains("account_id"));
    }

    #[test]
    fn test_validate_base_url() {
        let config = parse(json!({"api_token": "t", "account_id": "a", "base_url": "ftp://x"}));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_fallback() {
        let config = parse(json!({})).with_env_fallback(env(&[
            ("CLOUDFLARE_API_TOKEN", "env-token"),
            ("CLOUDFLARE_ACCOUNT_ID", "env-account"),
            ("CLOUDFLARE_BASE_URL", "http://localhost:8080"),
        ]));
        assert_eq!(config.api_token.as_deref(), Some("env-token"));
        assert_eq!(config.account_id, "env-account");
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_explicit_default_base_url_wins_over_env() {
        let config = parse(json!({"api_token": "t", "base_url": DEFAULT_BASE_URL}))
            .with_env_fallback(env(&[("CLOUDFLARE_BASE_URL", "http://localhost:8080")]));
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_from_value_with_env() {
        let config = ProviderConfig::from_value_with_env(
            serde_json::Value::Null,
            env(&[
                ("CLOUDFLARE_EMAIL", "ops@example.com"),
                ("CLOUDFLARE_API_KEY", "k"),
                ("CLOUDFLARE_ACCOUNT_ID", "a"),
            ]),
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);

        let config =
            ProviderConfig::from_value_with_env(json!({"api_token": "t"}), |_| None).unwrap();
        assert_eq!(config.account_id, "");
    }

    #[test]
    fn test_explicit_values_win_over_env() {
        let config = parse(json!({"api_token": "explicit", "account_id": "mine"}))
            .with_env_fallback(env(&[
                ("CLOUDFLARE_API_TOKEN", "env-token"),
                ("CLOUDFLARE_ACCOUNT_ID", "env-account"),
            ]));
        assert_eq!(config.api_token.as_deref(), Some("explicit"));
        assert_eq!(config.account_id, "mine");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = parse(json!({"api_token": "secret-token", "api_key": "secret-key"}));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("secret-key"));

        let debug = format!("{:?}", Credentials::Token("secret-token".to_string()));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_schema_marks_secrets_sensitive() {
        let schema = ProviderConfig::schema();
        assert!(schema.attributes["api_token"].flags.sensitive);
        assert!(schema.attributes["api_key"].flags.sensitive);
        assert!(!schema.attributes["email"].flags.sensitive);
    }
}
