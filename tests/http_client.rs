//! Integration tests for the Cloudflare HTTP client using wiremock
//!
//! These tests run the real client, and the provider on top of it, against
//! mocked addressing endpoints.

use cloudflare_ip_prefix_provider::client::{CloudflareClient, PrefixApi};
use cloudflare_ip_prefix_provider::{ApiError, IpPrefixProvider, ProviderConfig, ProviderError};
use cloudflare_ip_prefix_provider::{ProviderService, RESOURCE_TYPE};
use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PREFIX_PATH: &str = "/accounts/acct-1/addressing/prefixes/prefix-abc";
const BGP_PATH: &str = "/accounts/acct-1/addressing/prefixes/prefix-abc/bgp/status";

fn token_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        api_token: Some("test-token".to_string()),
        account_id: "acct-1".to_string(),
        base_url: Some(server.uri()),
        ..Default::default()
    }
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result
    }))
}

fn prefix_body(description: &str) -> Value {
    json!({
        "id": "prefix-abc",
        "account_id": "acct-1",
        "cidr": "192.0.2.0/24",
        "description": description,
        "approved": "V",
        "on_demand_enabled": false
    })
}

async fn mount_reads(server: &MockServer, description: &str, advertised: bool) {
    Mock::given(method("GET"))
        .and(path(PREFIX_PATH))
        .respond_with(ok(prefix_body(description)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(BGP_PATH))
        .respond_with(ok(json!({
            "advertised": advertised,
            "advertised_modified_at": "2024-01-01T00:00:00Z"
        })))
        .mount(server)
        .await;
}

/// Test module for the raw client
mod client_tests {
    use super::*;

    /// GET prefix is authenticated with the token and decodes the envelope
    #[tokio::test]
    async fn test_get_prefix_with_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PREFIX_PATH))
            .and(bearer_token("test-token"))
            .respond_with(ok(prefix_body("primary range")))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();
        let prefix = client.get_prefix("prefix-abc").await.unwrap();

        assert_eq!(prefix.id, "prefix-abc");
        assert_eq!(prefix.cidr, "192.0.2.0/24");
        assert_eq!(prefix.description, "primary range");
    }

    /// Key credentials are sent as the email/key header pair
    #[tokio::test]
    async fn test_get_advertisement_status_with_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(BGP_PATH))
            .and(header("X-Auth-Email", "ops@example.com"))
            .and(header("X-Auth-Key", "global-key"))
            .respond_with(ok(json!({"advertised": true})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig {
            email: Some("ops@example.com".to_string()),
            api_key: Some("global-key".to_string()),
            account_id: "acct-1".to_string(),
            base_url: Some(server.uri()),
            ..Default::default()
        };
        let client = CloudflareClient::new(&config).unwrap();
        let status = client.get_advertisement_status("prefix-abc").await.unwrap();

        assert!(status.advertised);
        assert!(status.advertised_modified_at.is_none());
    }

    /// PATCH bodies carry exactly the field being changed
    #[tokio::test]
    async fn test_patch_bodies() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path(PREFIX_PATH))
            .and(body_json(json!({"description": "renamed"})))
            .respond_with(ok(prefix_body("renamed")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(BGP_PATH))
            .and(body_json(json!({"advertised": false})))
            .respond_with(ok(json!({"advertised": false})))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();

        let prefix = client
            .update_prefix_description("prefix-abc", "renamed")
            .await
            .unwrap();
        assert_eq!(prefix.description, "renamed");

        let status = client
            .update_advertisement_status("prefix-abc", false)
            .await
            .unwrap();
        assert!(!status.advertised);
    }

    /// Non-2xx responses surface the status and envelope errors
    #[tokio::test]
    async fn test_404_returns_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PREFIX_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "errors": [{"code": 1000, "message": "Prefix not found"}],
                "result": null
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();
        let err = client.get_prefix("prefix-abc").await.unwrap_err();

        match err {
            ApiError::Status { status, messages } => {
                assert_eq!(status, 404);
                assert_eq!(messages, vec!["Prefix not found (1000)".to_string()]);
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// A non-JSON error body still yields the status
    #[tokio::test]
    async fn test_500_with_plain_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(BGP_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();
        let err = client
            .get_advertisement_status("prefix-abc")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Status { status: 500, ref messages } if messages.is_empty()));
    }

    /// A 200 with success=false is still an error
    #[tokio::test]
    async fn test_unsuccessful_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path(BGP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{"code": 1002, "message": "Prefix is not approved"}],
                "result": null
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();
        let err = client
            .update_advertisement_status("prefix-abc", true)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unsuccessful { .. }));
        assert!(err.to_string().contains("Prefix is not approved"));
    }

    /// Identifiers with path separators stay inside their own segment
    #[tokio::test]
    async fn test_prefix_id_is_path_encoded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts/acct-1/addressing/prefixes/real%2Fbgp%2Fstatus"))
            .respond_with(ok(json!({"id": "real/bgp/status", "description": "odd"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/accounts/acct-1/addressing/prefixes/real/bgp/status"))
            .respond_with(ok(json!({"advertised": true})))
            .expect(0)
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();
        let prefix = client.get_prefix("real/bgp/status").await.unwrap();

        assert_eq!(prefix.id, "real/bgp/status");
        assert_eq!(prefix.description, "odd");
    }

    /// A result that is not a prefix fails to decode
    #[tokio::test]
    async fn test_non_prefix_result_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PREFIX_PATH))
            .respond_with(ok(json!({"advertised": true})))
            .mount(&server)
            .await;

        let client = CloudflareClient::new(&token_config(&server)).unwrap();
        let err = client.get_prefix("prefix-abc").await.unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
    }
}

/// Test module for the provider running over HTTP
mod provider_tests {
    use super::*;

    async fn configured(server: &MockServer) -> IpPrefixProvider {
        let provider = IpPrefixProvider::new().with_env_lookup(|_| None);
        let diagnostics = provider
            .configure(json!({
                "api_token": "test-token",
                "account_id": "acct-1",
                "base_url": server.uri()
            }))
            .await
            .unwrap();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        provider
    }

    #[tokio::test]
    async fn test_read_through_provider() {
        let server = MockServer::start().await;
        mount_reads(&server, "primary range", true).await;

        let provider = configured(&server).await;
        let state = provider
            .read(RESOURCE_TYPE, json!({"prefix_id": "prefix-abc"}))
            .await
            .unwrap();

        assert_eq!(
            state,
            json!({
                "id": "prefix-abc",
                "prefix_id": "prefix-abc",
                "description": "primary range",
                "advertisement": "on"
            })
        );
    }

    #[tokio::test]
    async fn test_create_pushes_only_differences() {
        let server = MockServer::start().await;
        mount_reads(&server, "primary range", true).await;

        Mock::given(method("PATCH"))
            .and(path(PREFIX_PATH))
            .respond_with(ok(prefix_body("unused")))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(BGP_PATH))
            .and(body_json(json!({"advertised": false})))
            .respond_with(ok(json!({"advertised": false})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = configured(&server).await;
        let state = provider
            .create(
                RESOURCE_TYPE,
                json!({
                    "prefix_id": "prefix-abc",
                    "description": "primary range",
                    "advertisement": "off"
                }),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "prefix-abc");
        assert_eq!(state["advertisement"], "off");
    }

    #[tokio::test]
    async fn test_description_failure_stops_update() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path(PREFIX_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "errors": [{"code": 10000, "message": "Authentication error"}],
                "result": null
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(BGP_PATH))
            .respond_with(ok(json!({"advertised": false})))
            .expect(0)
            .mount(&server)
            .await;

        let provider = configured(&server).await;
        let err = provider
            .update(
                RESOURCE_TYPE,
                json!({
                    "id": "prefix-abc",
                    "prefix_id": "prefix-abc",
                    "description": "old",
                    "advertisement": "on"
                }),
                json!({
                    "prefix_id": "prefix-abc",
                    "description": "new",
                    "advertisement": "off"
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RemoteUpdate { .. }));
        assert!(err
            .to_string()
            .starts_with("Cannot update prefix description for \"prefix-abc\""));
    }

    #[tokio::test]
    async fn test_read_failure_is_wrapped() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PREFIX_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "errors": [{"code": 1000, "message": "Prefix not found"}],
                "result": null
            })))
            .mount(&server)
            .await;

        let provider = configured(&server).await;
        let err = provider
            .read(RESOURCE_TYPE, json!({"prefix_id": "prefix-abc"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RemoteRead { .. }));
        let message = err.to_string();
        assert!(message.starts_with("Error reading IP prefix information for \"prefix-abc\""));
        assert!(message.contains("404"));
    }

    #[tokio::test]
    async fn test_read_with_slash_in_prefix_id_stays_on_prefix_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts/acct-1/addressing/prefixes/real/bgp/status"))
            .respond_with(ok(json!({"advertised": true})))
            .expect(0)
            .mount(&server)
            .await;

        let provider = configured(&server).await;
        let err = provider
            .read(RESOURCE_TYPE, json!({"prefix_id": "real/bgp/status"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RemoteRead { .. }));
        assert!(err
            .to_string()
            .starts_with("Error reading IP prefix information for \"real/bgp/status\""));
    }
}
