// SPDX-License-Identifier: Apache-2.0

//! End-to-end contract tests driving a real listener over raw TCP.

use intake_server::{build_router, ApiConfig, AppState};
use intake_store::SqliteStore;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn start_server() -> SocketAddr {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open sqlite"));
    let state = AppState::with_config(store, ApiConfig::default());
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&Value>,
) -> (u16, String, Value) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let payload = body.map(Value::to_string).unwrap_or_default();
    let req = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\
         Content-Type: application/json\r\nX-Actor-Id: inspector-7\r\n\
         Content-Length: {}\r\n\r\n{payload}",
        payload.len()
    );
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .expect("status code");
    let parsed = serde_json::from_str(body).unwrap_or(Value::Null);
    (status, head.to_string(), parsed)
}

#[tokio::test]
async fn health_version_and_request_id_headers() {
    let addr = start_server().await;
    let (status, head, _) = send_raw(addr, "GET", "/health", None).await;
    assert_eq!(status, 200);
    assert!(
        head.to_ascii_lowercase().contains("x-request-id:"),
        "every response carries a request id"
    );

    let (status, _, body) = send_raw(addr, "GET", "/version", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["crate"], "intake-server");

    let (status, _, _) = send_raw(addr, "GET", "/readyz", None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn full_inspection_flow() {
    let addr = start_server().await;

    let (status, _, vehicle) = send_raw(
        addr,
        "POST",
        "/api/v1/vehicles",
        Some(&json!({"license_plate": "AB-1234", "make": "Toyota", "model": "Hilux"})),
    )
    .await;
    assert_eq!(status, 201);
    let vehicle_id = vehicle["id"].as_str().expect("vehicle id").to_string();

    let (status, _, inspection) = send_raw(
        addr,
        "POST",
        "/api/v1/inspections",
        Some(&json!({
            "vehicle_id": vehicle_id,
            "inspector_id": "inspector-7",
            "kind": "entry",
        })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(inspection["status"], "draft");
    let inspection_id = inspection["id"].as_str().expect("inspection id").to_string();

    let (status, _, patched) = send_raw(
        addr,
        "POST",
        &format!("/api/v1/inspections/{inspection_id}/update"),
        Some(&json!({"path": "exterior.paintCondition", "value": "good"})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(patched["success"], true);
    assert_eq!(patched["update"]["path"], "exterior.paintCondition");
    assert_eq!(patched["update"]["value"], "good");
    assert_eq!(patched["update"]["inspection_id"], inspection_id.as_str());
    assert_eq!(patched["update"]["actor_id"], "inspector-7");

    let (status, _, _) = send_raw(
        addr,
        "POST",
        &format!("/api/v1/inspections/{inspection_id}/update"),
        Some(&json!({"path": "exterior.photos.count", "value": 4})),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _, loaded) = send_raw(
        addr,
        "GET",
        &format!("/api/v1/inspections/{inspection_id}"),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        loaded["data"]["exterior"],
        json!({"paintCondition": "good", "photos": {"count": 4}})
    );

    let (status, _, data) = send_raw(
        addr,
        "GET",
        &format!("/api/v1/inspections/{inspection_id}/data"),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(data["data"], loaded["data"]);

    let (status, _, completed) = send_raw(
        addr,
        "PUT",
        &format!("/api/v1/inspections/{inspection_id}"),
        Some(&json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(completed["status"], "completed");
    assert!(completed["completed_at"].is_string());

    // A completed inspection refuses further patches.
    let (status, _, refused) = send_raw(
        addr,
        "POST",
        &format!("/api/v1/inspections/{inspection_id}/update"),
        Some(&json!({"path": "exterior.notes", "value": "late"})),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(refused["error"]["code"], "inspection_closed");
}

#[tokio::test]
async fn patch_error_contract() {
    let addr = start_server().await;

    let (status, _, body) = send_raw(
        addr,
        "POST",
        "/api/v1/inspections/does-not-exist/update",
        Some(&json!({"path": "a.b", "value": 1})),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    // Nothing was created by the failed patch.
    let (_, _, listed) = send_raw(addr, "GET", "/api/v1/inspections", None).await;
    assert_eq!(listed["inspections"], json!([]));

    let (status, _, body) = send_raw(
        addr,
        "POST",
        "/api/v1/inspections/does-not-exist/update",
        Some(&json!({"value": 1})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "malformed_input");

    let (status, _, body) = send_raw(
        addr,
        "POST",
        "/api/v1/inspections/does-not-exist/update",
        Some(&json!({"path": "a..b", "value": 1})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "malformed_input");
}

#[tokio::test]
async fn path_conflict_surfaces_as_409() {
    let addr = start_server().await;
    let (_, _, vehicle) = send_raw(
        addr,
        "POST",
        "/api/v1/vehicles",
        Some(&json!({"license_plate": "CC-0001"})),
    )
    .await;
    let vehicle_id = vehicle["id"].as_str().expect("vehicle id").to_string();
    let (_, _, inspection) = send_raw(
        addr,
        "POST",
        "/api/v1/inspections",
        Some(&json!({
            "vehicle_id": vehicle_id,
            "inspector_id": "inspector-7",
            "kind": "exit",
        })),
    )
    .await;
    let inspection_id = inspection["id"].as_str().expect("inspection id").to_string();

    let (status, _, _) = send_raw(
        addr,
        "POST",
        &format!("/api/v1/inspections/{inspection_id}/update"),
        Some(&json!({"path": "odometer", "value": 120000})),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _, body) = send_raw(
        addr,
        "POST",
        &format!("/api/v1/inspections/{inspection_id}/update"),
        Some(&json!({"path": "odometer.reading", "value": 120001})),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "path_conflict");
    assert_eq!(body["error"]["details"]["at"], "odometer");
}

#[tokio::test]
async fn inspections_for_unknown_vehicle_are_refused() {
    let addr = start_server().await;
    let (status, _, body) = send_raw(
        addr,
        "POST",
        "/api/v1/inspections",
        Some(&json!({
            "vehicle_id": "ghost-vehicle",
            "inspector_id": "inspector-7",
            "kind": "entry",
        })),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn duplicate_plate_is_a_conflict() {
    let addr = start_server().await;
    let body = json!({"license_plate": "DD-2222"});
    let (status, _, _) = send_raw(addr, "POST", "/api/v1/vehicles", Some(&body)).await;
    assert_eq!(status, 201);
    let (status, _, conflict) = send_raw(addr, "POST", "/api/v1/vehicles", Some(&body)).await;
    assert_eq!(status, 409);
    assert_eq!(conflict["error"]["code"], "conflict");
}

#[tokio::test]
async fn form_templates_round_trip() {
    let addr = start_server().await;
    let (status, _, created) = send_raw(
        addr,
        "POST",
        "/api/v1/form-templates",
        Some(&json!({
            "name": "Entry checklist",
            "kind": "entry",
            "sections": [{"name": "exterior", "fields": ["paintCondition"]}],
        })),
    )
    .await;
    assert_eq!(status, 201);
    let template_id = created["id"].as_str().expect("template id").to_string();

    let (status, _, updated) = send_raw(
        addr,
        "PUT",
        &format!("/api/v1/form-templates/{template_id}"),
        Some(&json!({"active": false})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(updated["active"], false);

    let (status, _, _) = send_raw(
        addr,
        "DELETE",
        &format!("/api/v1/form-templates/{template_id}"),
        None,
    )
    .await;
    assert_eq!(status, 200);

    let (status, _, body) = send_raw(
        addr,
        "GET",
        &format!("/api/v1/form-templates/{template_id}"),
        None,
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn metrics_reflect_traffic() {
    let addr = start_server().await;
    send_raw(addr, "GET", "/health", None).await;
    let (status, _, _) = send_raw(addr, "GET", "/metrics", None).await;
    assert_eq!(status, 200);

    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let req =
        format!("GET /metrics HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    assert!(response.contains("intake_requests_total"));
    assert!(response.contains("route=\"/health\""));
}
