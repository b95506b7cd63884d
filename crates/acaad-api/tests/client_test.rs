#![allow(clippy::unwrap_used)]
// Integration tests for `AcaadClient` using wiremock.

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use acaad_api::{AcaadClient, Error, Host, OperationMethod, TraceParent, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AcaadClient, Host) {
    let server = MockServer::start().await;
    let addr = server.address();
    let host = Host::new("mock", addr.ip().to_string(), addr.port());
    let client = AcaadClient::new(&TransportConfig::default()).unwrap();
    (server, client, host)
}

fn discovery_document() -> serde_json::Value {
    json!({
        "openapi": "3.0.1",
        "info": {
            "title": "ACAAD mock",
            "description": "mock server",
            "version": "1.0.0",
            "acaad": "1.0.0+abc",
            "acaad.metadata": { "name": "mock", "os": "linux", "otlpEnabled": true }
        },
        "paths": {
            "/api/lamp/on": { "post": { "acaad": {
                "component": { "type": "Switch", "name": "lamp" },
                "actionable": true, "forValue": true, "onIff": true, "type": "Boolean"
            } } }
        }
    })
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_document() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/openapi/v1.json"))
        .and(header_exists("traceparent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document()))
        .expect(1)
        .mount(&server)
        .await;

    let doc = client.fetch_document(&host, &TraceParent::mint()).await.unwrap();
    assert_eq!(doc.info.acaad, "1.0.0+abc");
    assert!(doc.info.metadata.otlp_enabled);
    assert_eq!(doc.operations().count(), 1);
}

#[tokio::test]
async fn test_fetch_document_empty_body() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/openapi/v1.json"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = client.fetch_document(&host, &TraceParent::mint()).await;
    assert!(
        matches!(result, Err(Error::Schema { .. })),
        "expected Schema error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_fetch_document_non_acaad_server() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/openapi/v1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openapi": "3.0.1",
            "info": { "title": "petstore", "version": "1" },
            "paths": {}
        })))
        .mount(&server)
        .await;

    let result = client.fetch_document(&host, &TraceParent::mint()).await;
    assert!(matches!(result, Err(Error::Schema { .. })), "got: {result:?}");
}

#[tokio::test]
async fn test_fetch_document_status_error() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/openapi/v1.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client.fetch_document(&host, &TraceParent::mint()).await;
    match result {
        Err(Error::Status { expected, actual, .. }) => {
            assert_eq!(expected, 200);
            assert_eq!(actual, 503);
        }
        other => panic!("expected Status error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_document_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = AcaadClient::new(&TransportConfig::default()).unwrap();
    let host = Host::new("offline", "127.0.0.1", port);

    let err = client
        .fetch_document(&host, &TraceParent::mint())
        .await
        .unwrap_err();
    assert!(err.is_unreachable(), "expected unreachable, got: {err:?}");
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_execute_forwards_traceparent() {
    let (server, client, host) = setup().await;
    let trace = TraceParent::mint();

    Mock::given(method("POST"))
        .and(path("/api/lamp/on"))
        .and(wiremock::matchers::header("traceparent", trace.to_header().as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .execute(&host, OperationMethod::Post, "/api/lamp/on", &trace)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_execute_non_success_status() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/temp"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client
        .execute(&host, OperationMethod::Get, "api/temp", &TraceParent::mint())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}
