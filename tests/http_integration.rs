//! Integration tests for the REST provider using wiremock
//!
//! These tests drive [`RestProvider`] and the discovery engine against mocked
//! endpoints, checking URL rendering, paging, aggregated demultiplexing and
//! the mapping of HTTP failures onto provider errors.

use gcp_discovery::gcp::auth::GcpCredentials;
use gcp_discovery::gcp::{ApiCall, GcpClient, ProviderApi, ProviderError, RestProvider};
use gcp_discovery::{Config, Discovery, Location, MemoryCache, QueryContext, Registry};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INSTANCES_PATH: &str = "compute/v1/projects/{project}/zones/{zone}/instances";
const INSTANCE_PATH: &str = "compute/v1/projects/{project}/zones/{zone}/instances/{0}";
const AGGREGATED_PATH: &str = "compute/v1/projects/{project}/aggregated/instances";

fn provider(server: &MockServer) -> RestProvider {
    let registry = Registry::builtin().expect("builtin registry");
    let mut client = GcpClient::with_credentials(
        GcpCredentials::from_static_token("test-token"),
        registry.services().clone(),
    )
    .expect("client");
    client.override_roots(&server.uri());
    RestProvider::new(client)
}

fn call<'a>(path: &'a str, items_field: &'a str, location: &'a Location, query: &'a [String]) -> ApiCall<'a> {
    ApiCall {
        item_type: "gcp-compute-instance",
        service: "compute",
        path,
        items_field,
        location,
        query,
    }
}

/// Test module for provider integration tests
mod rest_provider_tests {
    use super::*;

    /// Test successful GET renders the path and returns parsed JSON
    #[tokio::test]
    async fn test_get_success_returns_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances/vm-1"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "vm-1",
                "status": "RUNNING"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let location = Location::zonal("test-project", "us-central1-a");
        let query = vec!["vm-1".to_string()];
        let body = provider(&server)
            .get(&call(INSTANCE_PATH, "items", &location, &query))
            .await
            .expect("GET should succeed");

        assert_eq!(body["name"], "vm-1");
    }

    /// Test 404 response becomes NotFound carrying the API message
    #[tokio::test]
    async fn test_404_returns_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "The resource 'gone' was not found"
                }
            })))
            .mount(&server)
            .await;

        let location = Location::zonal("test-project", "us-central1-a");
        let query = vec!["gone".to_string()];
        let err = provider(&server)
            .get(&call(INSTANCE_PATH, "items", &location, &query))
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::NotFound("The resource 'gone' was not found".to_string()));
    }

    /// Test 403 response carries status and message
    #[tokio::test]
    async fn test_403_returns_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": 403,
                    "message": "Required 'compute.instances.list' permission"
                }
            })))
            .mount(&server)
            .await;

        let location = Location::zonal("test-project", "us-central1-a");
        let err = provider(&server)
            .list(&call(INSTANCES_PATH, "items", &location, &[]), None)
            .await
            .unwrap_err();

        match err {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("compute.instances.list"));
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// Test 500 with a non-JSON body still yields a status error
    #[tokio::test]
    async fn test_500_with_html_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances/vm-1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let location = Location::zonal("test-project", "us-central1-a");
        let query = vec!["vm-1".to_string()];
        let err = provider(&server)
            .get(&call(INSTANCE_PATH, "items", &location, &query))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Status { status: 500, .. }));
        assert_eq!(err.user_message(), "GCP service temporarily unavailable. Please try again.");
    }

    /// Test a rejected token is refreshed and the request retried once
    #[tokio::test]
    async fn test_401_retries_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances/vm-1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Request had invalid authentication credentials"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let location = Location::zonal("test-project", "us-central1-a");
        let query = vec!["vm-1".to_string()];
        let err = provider(&server)
            .get(&call(INSTANCE_PATH, "items", &location, &query))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    }

    /// Test pagination with nextPageToken
    #[tokio::test]
    async fn test_pagination_with_next_page_token() {
        let server = MockServer::start().await;

        // Second page, matched first by priority
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .and(query_param("pageToken", "token-page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "instance-3"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        // First page
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "instance-1"}, {"name": "instance-2"}],
                "nextPageToken": "token-page-2"
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let location = Location::zonal("test-project", "us-central1-a");
        let call = call(INSTANCES_PATH, "items", &location, &[]);

        let first = provider.list(&call, None).await.expect("first page");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("token-page-2"));

        let second = provider.list(&call, Some("token-page-2")).await.expect("second page");
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["name"], "instance-3");
        assert!(second.next_page_token.is_none());
    }

    /// Test aggregated list requests partial success and splits entries by scope
    #[tokio::test]
    async fn test_aggregated_list_demultiplexes_scopes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/aggregated/instances"))
            .and(query_param("returnPartialSuccess", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": {
                    "zones/us-central1-a": {"instances": [{"name": "vm-1"}, {"name": "vm-2"}]},
                    "zones/europe-west1-b": {"instances": [{"name": "vm-3"}]},
                    "zones/asia-east1-a": {
                        "warning": {"code": "NO_RESULTS_ON_PAGE", "message": "empty"}
                    }
                },
                "unreachables": ["zones/me-west1-a"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let location = Location::project("test-project");
        let page = provider(&server)
            .aggregated_list(&call(AGGREGATED_PATH, "instances", &location, &[]), None)
            .await
            .expect("aggregated list");

        assert_eq!(page.entries.len(), 2);
        let total: usize = page.entries.iter().map(|(_, bodies)| bodies.len()).sum();
        assert_eq!(total, 3);
        assert!(page.entries.iter().any(|(key, _)| key == "zones/europe-west1-b"));
        assert!(page.next_page_token.is_none());
    }
}

/// End-to-end tests through the discovery engine
mod discovery_tests {
    use super::*;

    fn discovery(server: &MockServer) -> Discovery {
        let registry = Registry::builtin().expect("builtin registry");
        let config = Config {
            projects: vec!["test-project".to_string()],
            zones: vec!["us-central1-a".to_string()],
            ..Config::default()
        };
        Discovery::new(
            &registry,
            &config,
            Arc::new(provider(server)),
            Arc::new(MemoryCache::new()),
        )
    }

    /// Test wildcard list keeps configured zones only and warms GET entries
    #[tokio::test]
    async fn test_wildcard_list_then_cached_get() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/aggregated/instances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": {
                    "zones/us-central1-a": {"instances": [{"name": "vm-1", "status": "RUNNING"}]},
                    "zones/europe-west1-b": {"instances": [{"name": "vm-2", "status": "RUNNING"}]}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let discovery = discovery(&server);
        let ctx = QueryContext::new();

        let results = discovery
            .list(&ctx, "gcp-compute-instance", "*")
            .await
            .expect("wildcard list");
        assert!(results.errors.is_empty());
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].scope, "test-project.us-central1-a");

        // Served from the cache; no GET mock is mounted
        let item = discovery
            .get(&ctx, "gcp-compute-instance", "test-project.us-central1-a", &["vm-1"])
            .await
            .expect("cached get");
        assert_eq!(item.unique_attribute_value().as_deref(), Some("vm-1"));
    }

    /// Test a BigQuery table GET resolves its connection edge
    #[tokio::test]
    async fn test_table_get_links_connection() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/test-project/datasets/sales/tables/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tableReference": {
                    "projectId": "test-project",
                    "datasetId": "sales",
                    "tableId": "orders"
                },
                "externalDataConfiguration": {"connectionId": "myproject.us;conn1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let discovery = discovery(&server);
        let item = discovery
            .get(&QueryContext::new(), "gcp-big-query-table", "test-project", &["sales|orders"])
            .await
            .expect("table get");

        let connections: Vec<_> = item
            .edges
            .iter()
            .filter(|e| e.target_type == "gcp-big-query-connection")
            .collect();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].query, "us|conn1");
        assert_eq!(connections[0].target_scope, "myproject");
    }

    /// Test 404 on GET surfaces NOTFOUND and is cached
    #[tokio::test]
    async fn test_get_not_found_is_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/global/networks/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let discovery = discovery(&server);
        let ctx = QueryContext::new();
        for _ in 0..2 {
            let err = discovery
                .get(&ctx, "gcp-compute-network", "test-project", &["missing"])
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }
    }
}
