//! Client for the Cloudflare IP address management API.
//!
//! [`PrefixApi`] is the seam resource operations depend on; [`CloudflareClient`]
//! is the HTTP implementation. Calls are single attempts: no retries, rate
//! limiting or pagination.

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{Credentials, ProviderConfig};
use crate::error::{ApiError, ProviderError};

/// Maximum length of a body written to the debug log.
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Prefix metadata returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Prefix {
    /// The prefix identifier.
    pub id: String,
    /// The routable block, e.g. `192.0.2.0/24`.
    #[serde(default)]
    pub cidr: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// The account owning the prefix.
    #[serde(default)]
    pub account_id: String,
    /// Whether the prefix is approved for use.
    #[serde(default)]
    pub approved: String,
}

/// BGP advertisement status of a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdvertisementStatus {
    /// Whether the prefix is currently announced.
    pub advertised: bool,
    /// When the status last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_modified_at: Option<String>,
}

/// Operations on prefixes that the resource needs.
#[async_trait::async_trait]
pub trait PrefixApi: Send + Sync {
    /// Fetch prefix metadata.
    async fn get_prefix(&self, prefix_id: &str) -> Result<Prefix, ApiError>;

    /// Fetch the advertisement status.
    async fn get_advertisement_status(
        &self,
        prefix_id: &str,
    ) -> Result<AdvertisementStatus, ApiError>;

    /// Replace the prefix description.
    async fn update_prefix_description(
        &self,
        prefix_id: &str,
        description: &str,
    ) -> Result<Prefix, ApiError>;

    /// Start or stop announcing the prefix.
    async fn update_advertisement_status(
        &self,
        prefix_id: &str,
        advertised: bool,
    ) -> Result<AdvertisementStatus, ApiError>;
}

/// The standard Cloudflare v4 response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ResponseMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl ResponseMessage {
    fn render(&self) -> String {
        if self.code == 0 {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, self.code)
        }
    }
}

#[derive(Serialize)]
struct DescriptionPatch<'a> {
    description: &'a str,
}

#[derive(Serialize)]
struct AdvertisementPatch {
    advertised: bool,
}

/// HTTP client for the account-scoped addressing endpoints.
#[derive(Clone)]
pub struct CloudflareClient {
    client: Client,
    base_url: String,
    account_id: String,
    credentials: Credentials,
    log_bodies: bool,
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl CloudflareClient {
    /// Build a client from provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let credentials = config.credentials()?;

        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            credentials,
            log_bodies: config.api_client_logging,
        })
    }

    /// The account the client operates on.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Identifiers are encoded as single path segments.
    fn prefix_url(&self, prefix_id: &str) -> String {
        format!(
            "{}/accounts/{}/addressing/prefixes/{}",
            self.base_url,
            urlencoding::encode(&self.account_id),
            urlencoding::encode(prefix_id)
        )
    }

    fn bgp_status_url(&self, prefix_id: &str) -> String {
        format!("{}/bgp/status", self.prefix_url(prefix_id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::Key { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    async fn send<T, B>(&self, method: Method, url: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(method = %method, url = %url, "API request");

        let mut request = self.authorize(self.client.request(method.clone(), url));
        if let Some(body) = body {
            if self.log_bodies {
                if let Ok(encoded) = serde_json::to_string(body) {
                    debug!(body = %sanitize_for_log(&encoded), "API request body");
                }
            }
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if self.log_bodies {
            debug!(status = status.as_u16(), body = %sanitize_for_log(&text), "API response");
        }

        if !status.is_success() {
            let messages = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
                .map(|envelope| envelope.errors.iter().map(ResponseMessage::render).collect())
                .unwrap_or_default();
            error!(method = %method, url = %url, status = status.as_u16(), "API request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                messages,
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        if !envelope.success {
            return Err(ApiError::Unsuccessful {
                messages: envelope.errors.iter().map(ResponseMessage::render).collect(),
            });
        }
        envelope.result.ok_or(ApiError::MissingResult)
    }
}

#[async_trait::async_trait]
impl PrefixApi for CloudflareClient {
    async fn get_prefix(&self, prefix_id: &str) -> Result<Prefix, ApiError> {
        self.send::<_, ()>(Method::GET, &self.prefix_url(prefix_id), None)
            .await
    }

    async fn get_advertisement_status(
        &self,
        prefix_id: &str,
    ) -> Result<AdvertisementStatus, ApiError> {
        self.send::<_, ()>(Method::GET, &self.bgp_status_url(prefix_id), None)
            .await
    }

    async fn update_prefix_description(
        &self,
        prefix_id: &str,
        description: &str,
    ) -> Result<Prefix, ApiError> {
        self.send(
            Method::PATCH,
            &self.prefix_url(prefix_id),
            Some(&DescriptionPatch { description }),
        )
        .await
    }

    async fn update_advertisement_status(
        &self,
        prefix_id: &str,
        advertised: bool,
    ) -> Result<AdvertisementStatus, ApiError> {
        self.send(
            Method::PATCH,
            &self.bgp_status_url(prefix_id),
            Some(&AdvertisementPatch { advertised }),
        )
        .await
    }
}

/// Truncate a body for logging and drop control characters.
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..end],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_token: Some("token".to_string()),
            account_id: "acct".to_string(),
            base_url: Some("https://api.example.com/client/v4/".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_urls() {
        let client = CloudflareClient::new(&config()).unwrap();
        assert_eq!(
            client.prefix_url("p1"),
            "https://api.example.com/client/v4/accounts/acct/addressing/prefixes/p1"
        );
        assert_eq!(
            client.bgp_status_url("p1"),
            "https://api.example.com/client/v4/accounts/acct/addressing/prefixes/p1/bgp/status"
        );
        assert_eq!(client.account_id(), "acct");
    }

    #[test]
    fn test_urls_encode_identifiers() {
        let client = CloudflareClient::new(&config()).unwrap();
        assert_eq!(
            client.prefix_url("real/bgp/status"),
            "https://api.example.com/client/v4/accounts/acct/addressing/prefixes/real%2Fbgp%2Fstatus"
        );
        assert_eq!(
            client.bgp_status_url("a?b#c"),
            "https://api.example.com/client/v4/accounts/acct/addressing/prefixes/a%3Fb%23c/bgp/status"
        );
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = ProviderConfig {
            account_id: "acct".to_string(),
            ..Default::default()
        };
        let err = CloudflareClient::new(&config).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let client = CloudflareClient::new(&config()).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("acct"));
        assert!(!debug.contains("token"));
    }

    #[test]
    fn test_sanitize_for_log() {
        assert_eq!(sanitize_for_log("{\"a\":\n1}"), "{\"a\":1}");

        let long = "x".repeat(MAX_LOG_BODY_LENGTH + 50);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("truncated, 250 bytes total"));
    }

    #[test]
    fn test_envelope_decoding() {
        let envelope: Envelope<AdvertisementStatus> = serde_json::from_str(
            r#"{"success":true,"errors":[],"messages":[],"result":{"advertised":true,"advertised_modified_at":"2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        assert!(envelope.success);
        assert!(envelope.result.unwrap().advertised);

        let envelope: Envelope<Prefix> = serde_json::from_str(
            r#"{"success":false,"errors":[{"code":1000,"message":"bad"}],"result":null}"#,
        )
        .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.errors[0].render(), "bad (1000)");
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_prefix_requires_id() {
        let result = serde_json::from_str::<Envelope<Prefix>>(
            r#"{"success":true,"errors":[],"result":{"advertised":true}}"#,
        );
        assert!(result.is_err());

        let prefix: Prefix = serde_json::from_str(r#"{"id":"p1"}"#).unwrap();
        assert_eq!(prefix.id, "p1");
        assert_eq!(prefix.description, "");
    }
}
