//! Error types for the IP prefix provider.

use thiserror::Error;

/// Errors returned by the remote addressing API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status code.
    #[error("API request failed with status {status}: {}", join_messages(.messages))]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Messages taken from the response envelope.
        messages: Vec<String>,
    },

    /// The API answered 2xx but flagged the call as unsuccessful.
    #[error("API request was not successful: {}", join_messages(.messages))]
    Unsuccessful {
        /// Messages taken from the response envelope.
        messages: Vec<String>,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response envelope carried no result.
    #[error("API response contained no result")]
    MissingResult,
}

fn join_messages(messages: &[String]) -> String {
    if messages.is_empty() {
        "no error details".to_string()
    } else {
        messages.join("; ")
    }
}

/// Errors that can occur while serving the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Reading remote state failed.
    #[error("{context}: {source}")]
    RemoteRead {
        /// What was being read, naming the prefix.
        context: String,
        /// The underlying API failure.
        #[source]
        source: ApiError,
    },

    /// Pushing a change to the remote system failed.
    #[error("{context}: {source}")]
    RemoteUpdate {
        /// What was being updated, naming the prefix.
        context: String,
        /// The underlying API failure.
        #[source]
        source: ApiError,
    },

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resource operation was requested before `configure`.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request from the orchestrator.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Wrap a failed remote read with a message naming what was read.
    pub fn remote_read(context: impl Into<String>, source: ApiError) -> Self {
        Self::RemoteRead {
            context: context.into(),
            source,
        }
    }

    /// Wrap a failed remote update with a message naming what was updated.
    pub fn remote_update(context: impl Into<String>, source: ApiError) -> Self {
        Self::RemoteUpdate {
            context: context.into(),
            source,
        }
    }

    /// Get the error message as a string.
    ///
    /// For wrapped remote errors this is the context only; use `Display`
    /// for the full chain.
    pub fn message(&self) -> &str {
        match self {
            Self::RemoteRead { context, .. } => context,
            Self::RemoteUpdate { context, .. } => context,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::NotConfigured(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Whether this error came from the remote API.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteRead { .. } | Self::RemoteUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Validation("bad advertisement".to_string());
        assert_eq!(format!("{}", err), "Validation error: bad advertisement");

        let err = ProviderError::UnknownResource("cloudflare_zone".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: cloudflare_zone");

        let err = ProviderError::NotConfigured("call configure first".to_string());
        assert_eq!(
            format!("{}", err),
            "Provider not configured: call configure first"
        );
    }

    #[test]
    fn test_remote_read_wraps_cause() {
        let err = ProviderError::remote_read(
            "Error reading IP prefix information for \"prefix-abc\"",
            ApiError::Status {
                status: 404,
                messages: vec!["Prefix not found".to_string()],
            },
        );

        assert_eq!(
            err.to_string(),
            "Error reading IP prefix information for \"prefix-abc\": \
             API request failed with status 404: Prefix not found"
        );
        assert!(err.is_remote());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_remote_update_wraps_cause() {
        let err = ProviderError::remote_update(
            "Cannot update prefix description for \"prefix-abc\"",
            ApiError::Unsuccessful { messages: vec![] },
        );

        assert_eq!(
            err.to_string(),
            "Cannot update prefix description for \"prefix-abc\": \
             API request was not successful: no error details"
        );
        assert_eq!(
            err.message(),
            "Cannot update prefix description for \"prefix-abc\""
        );
    }

    #[test]
    fn test_api_error_joins_messages() {
        let err = ApiError::Status {
            status: 400,
            messages: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "API request failed with status 400: first; second"
        );

        assert_eq!(
            ApiError::MissingResult.to_string(),
            "API response contained no result"
        );
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("missing account_id".to_string());
        assert_eq!(err.message(), "missing account_id");
        assert!(!err.is_remote());

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }

    #[test]
    fn test_serialization_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::Serialization(_)));
    }
}
