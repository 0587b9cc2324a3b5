//! Integration tests for the HTTP surface

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bifrost::{CallLogger, FnError, LogKind, LogRecord, Registry, Subscription};
use bifrost_server::api::auth::allow_any;
use bifrost_server::api::routes::NOT_WIRE_SAFE;
use bifrost_server::api::server::{ApiServer, ApiServerConfig};
use bifrost_server::api::JwtAuth;
use bifrost_server::demo::acme_registry;

const SECRET: &str = "test_secret_key_12345";

fn test_config() -> ApiServerConfig {
    ApiServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_prefix: "/api-functions/".to_string(),
        auth_key: "web".to_string(),
        jwt_secret: SECRET.to_string(),
    }
}

/// Start a server on an ephemeral port and return its address
async fn start_test_server(server: ApiServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve_on(listener).await;
    });
    addr
}

async fn start_demo_server() -> SocketAddr {
    let registry = acme_registry(Arc::new(JwtAuth::new(SECRET))).unwrap();
    start_test_server(ApiServer::new(test_config(), Arc::new(registry))).await
}

async fn post(addr: SocketAddr, name: &str, body: Value) -> (StatusCode, Value) {
    let response = Client::new()
        .post(format!("http://{}/api-functions/{}", addr, name))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let addr = start_demo_server().await;

    let response = Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["functions"], 5);
}

#[tokio::test]
async fn test_open_function_returns_json() {
    let addr = start_demo_server().await;

    let (status, body) = post(addr, "double", json!({"n": 21})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(42));

    let (status, body) = post(addr, "hello3", json!({"name": "Kevin", "age": 34})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Hello 3 Kevin. You are 34 years old"));
}

#[tokio::test]
async fn test_guard_status_is_forwarded() {
    let addr = start_demo_server().await;

    let (status, body) = post(addr, "hello1", json!({"name": "Kevin"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"status": "Error"}));
}

#[tokio::test]
async fn test_bearer_guard_over_http() {
    let addr = start_demo_server().await;
    let url = format!("http://{}/api-functions/hello2", addr);
    let person = json!({"name": "Ada", "age": 36});

    let response = Client::new().post(&url).json(&person).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = JwtAuth::new(SECRET).generate_token("tester", Some(1)).unwrap();
    let response = Client::new()
        .post(&url)
        .header("Authorization", format!("Bearer {}", token))
        .json(&person)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!("Hello 2 Ada. You are 36 years old"));
}

#[tokio::test]
async fn test_channel_output_is_not_wire_safe() {
    let addr = start_demo_server().await;

    let (status, body) = post(addr, "ticker", json!({"every_ms": 50})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"status": NOT_WIRE_SAFE}));
}

#[tokio::test]
async fn test_unguarded_function_is_refused() {
    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);
    let registry = Registry::new().sync_function("secret", move |_: Value| {
        *flag.lock().unwrap() = true;
        Ok("leaked")
    });
    let addr = start_test_server(ApiServer::new(test_config(), Arc::new(registry))).await;

    let (status, body) = post(addr, "secret", json!(null)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({
            "status": "unauthorized",
            "details": "No auth defined for this function. AuthKey: web"
        })
    );
    assert!(!*ran.lock().unwrap());
}

#[tokio::test]
async fn test_function_errors_map_to_status() {
    let registry = Registry::new()
        .function("teapot", |_: Value| async move {
            Err::<Value, _>(FnError::with_status(418, "short and stout"))
        })
        .function("broken", |_: Value| async move { Err::<Value, _>(FnError::new("boom")) })
        .channel("stream", |_: Value| Subscription::<u8>::detached())
        .guard("teapot", "web", allow_any)
        .and_then(|r| r.guard("broken", "web", allow_any))
        .and_then(|r| r.guard("stream", "web", allow_any))
        .unwrap();
    let addr = start_test_server(ApiServer::new(test_config(), Arc::new(registry))).await;

    let (status, body) = post(addr, "teapot", json!(null)).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, json!({"status": "Error"}));

    let (status, body) = post(addr, "broken", json!(null)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Error"}));

    let (status, body) = post(addr, "stream", json!(null)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"status": NOT_WIRE_SAFE}));
}

#[tokio::test]
async fn test_empty_body_is_null_argument() {
    let registry = Registry::new()
        .sync_function("echo", |v: Value| Ok(json!({"got": v})))
        .guard("echo", "web", allow_any)
        .unwrap();
    let addr = start_test_server(ApiServer::new(test_config(), Arc::new(registry))).await;

    let response = Client::new()
        .post(format!("http://{}/api-functions/echo", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"got": null}));
}

#[tokio::test]
async fn test_requests_are_logged() {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    let logger: Arc<dyn CallLogger> = Arc::new(move |r: &LogRecord| {
        sink.lock().unwrap().push((r.fn_name.clone(), r.kind));
    });

    let registry = acme_registry(Arc::new(JwtAuth::new(SECRET))).unwrap();
    let server = ApiServer::new(test_config(), Arc::new(registry)).with_logger(logger);
    let addr = start_test_server(server).await;

    post(addr, "double", json!({"n": 1})).await;

    let kinds = kinds.lock().unwrap();
    assert_eq!(*kinds, vec![("double".to_string(), LogKind::HttpRequest)]);
}

#[tokio::test]
async fn test_malformed_body_is_logged_and_rejected() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let logger: Arc<dyn CallLogger> = Arc::new(move |r: &LogRecord| {
        sink.lock().unwrap().push(r.clone());
    });

    let registry = acme_registry(Arc::new(JwtAuth::new(SECRET))).unwrap();
    let server = ApiServer::new(test_config(), Arc::new(registry)).with_logger(logger);
    let addr = start_test_server(server).await;

    let response = Client::new()
        .post(format!("http://{}/api-functions/double", addr))
        .header("Content-Type", "application/json")
        .body("{oops")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, LogKind::HttpRequest);
    assert_eq!(records[0].payload, Some(json!("{oops")));
    assert!(records[0].error.is_some());
}
