//! IPC integration tests - validates codec→router→service→response round-trip.

use axum::routing::get;
use axum::{Json, Router};
use jeeves_toolgate::ipc::codec::{write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use jeeves_toolgate::ipc::IpcServer;
use jeeves_toolgate::{Config, InMemoryToolStore, IpcConfig, ToolService};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Helper: spin up an IpcServer on a random port, return (addr, server).
async fn start_test_server() -> (std::net::SocketAddr, Arc<IpcServer>) {
    let service = Arc::new(
        ToolService::new(Arc::new(InMemoryToolStore::new()), &Config::default()).unwrap(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(IpcServer::new(service, addr, IpcConfig::default()));

    let serving = server.clone();
    tokio::spawn(async move {
        let _ = serving.serve_on(listener).await;
    });

    (addr, server)
}

/// Helper: send a request frame, receive and decode the response.
async fn round_trip(stream: &mut TcpStream, service: &str, method: &str, body: Value) -> (u8, Value) {
    let request = json!({
        "id": "test-1",
        "service": service,
        "method": method,
        "body": body,
    });

    let payload = rmp_serde::to_vec_named(&request).unwrap();
    write_frame(stream, MSG_REQUEST, &payload).await.unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let frame_len = u32::from_be_bytes(len_buf) as usize;
    let mut frame_data = vec![0u8; frame_len];
    stream.read_exact(&mut frame_data).await.unwrap();

    let msg_type = frame_data[0];
    let response: Value = rmp_serde::from_slice(&frame_data[1..]).unwrap();
    (msg_type, response)
}

fn weather_tool(endpoint: &str) -> Value {
    json!({
        "id": "weather-tool",
        "name": "Weather",
        "description": "Current conditions",
        "apiEndpoint": endpoint,
        "method": "GET",
        "timeout": 2000,
    })
}

#[tokio::test]
async fn test_create_list_get_round_trip() {
    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "tools",
        "CreateTool",
        json!({"tenant_id": "org-1", "tool": weather_tool("https://api.example.com/weather")}),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(response["ok"], true);
    assert_eq!(response["id"], "test-1");
    assert_eq!(response["body"]["tool"]["id"], "weather-tool");
    assert_eq!(response["body"]["tool"]["status"], "active");

    let (msg_type, response) =
        round_trip(&mut stream, "tools", "ListTools", json!({"tenant_id": "org-1"})).await;
    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(response["body"]["count"], 1);
    assert_eq!(response["body"]["skipped"], json!([]));
    let built_at = response["body"]["builtAt"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(built_at).is_ok(), "builtAt: {}", built_at);

    // Tenants are isolated.
    let (_, response) =
        round_trip(&mut stream, "tools", "ListTools", json!({"tenant_id": "org-2"})).await;
    assert_eq!(response["body"]["count"], 0);

    let (msg_type, response) = round_trip(
        &mut stream,
        "tools",
        "GetTool",
        json!({"tenant_id": "org-1", "tool_id": "weather-tool"}),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(response["body"]["found"], true);
    assert_eq!(
        response["body"]["tool"]["apiEndpoint"],
        "https://api.example.com/weather"
    );
}

#[tokio::test]
async fn test_unknown_service_returns_error() {
    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(&mut stream, "nonexistent", "Foo", json!({})).await;

    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_definition_lists_violations() {
    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "tools",
        "CreateTool",
        json!({
            "tenant_id": "org-1",
            "tool": {"id": "broken", "apiEndpoint": "not a url", "method": "TRACE"},
        }),
    )
    .await;

    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["error"]["code"], "INVALID_ARGUMENT");
    let violations = response["error"]["violations"].as_array().unwrap();
    assert!(violations.len() >= 3, "violations: {:?}", violations);

    // Nothing was persisted.
    let (_, response) =
        round_trip(&mut stream, "tools", "ListTools", json!({"tenant_id": "org-1"})).await;
    assert_eq!(response["body"]["count"], 0);
}

#[tokio::test]
async fn test_delete_missing_tool_is_not_found() {
    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "tools",
        "DeleteTool",
        json!({"tenant_id": "org-1", "tool_id": "ghost"}),
    )
    .await;
    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_missing_tenant_is_invalid_argument() {
    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(&mut stream, "tools", "ListTools", json!({})).await;
    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_health_check_all_empty_tenant() {
    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "tools",
        "HealthCheckAll",
        json!({"tenant_id": "org-empty"}),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let body = &response["body"];
    assert_eq!(body["total"], 0);
    assert_eq!(body["healthy"], 0);
    assert_eq!(body["unhealthy"], 0);
    assert_eq!(body["averageResponseTime"], 0.0);
}

#[tokio::test]
async fn test_execute_tool_over_ipc() {
    let upstream = Router::new().route(
        "/weather",
        get(|| async { Json(json!({"location": "Paris", "temperature": 18.5})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });

    let (addr, _server) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let endpoint = format!("http://{}/weather", upstream_addr);
    let (msg_type, _) = round_trip(
        &mut stream,
        "tools",
        "CreateTool",
        json!({"tenant_id": "org-1", "tool": weather_tool(&endpoint)}),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);

    let (msg_type, response) = round_trip(
        &mut stream,
        "tools",
        "ExecuteTool",
        json!({
            "tenant_id": "org-1",
            "tool_id": "weather-tool",
            "input": {"location": "Paris"},
        }),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let body = &response["body"];
    assert_eq!(body["toolId"], "weather-tool");
    assert_eq!(body["output"]["temperature"], 18.5);
    assert_eq!(body["attempts"], 1);
    assert!(body["error"].is_null());

    let (_, response) = round_trip(
        &mut stream,
        "tools",
        "GetToolStats",
        json!({"tenant_id": "org-1", "tool_id": "weather-tool"}),
    )
    .await;
    assert_eq!(response["body"]["totalCalls"], 1);
    assert_eq!(response["body"]["successRate"], 1.0);
}
