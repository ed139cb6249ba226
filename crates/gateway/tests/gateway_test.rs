use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use code_runner_core::config::{SandboxConfig, UploadConfig};
use code_runner_gateway::{GatewayConfig, GatewayServer};
use code_runner_sandbox::{ExecutionService, MockEngine};
use code_runner_store::InMemoryExecutionStore;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "code-runner-test-boundary";

fn app(engine: MockEngine, upload_root: &Path) -> Router {
    let service = ExecutionService::new(
        Arc::new(engine),
        Arc::new(InMemoryExecutionStore::new()),
        SandboxConfig::default(),
    );
    let uploads = UploadConfig {
        root_dir: upload_root.to_string_lossy().into_owned(),
        max_upload_bytes: 1024 * 1024,
    };
    GatewayServer::new(GatewayConfig::default(), service, &uploads).build_router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a multipart body from `(field, filename, content)` parts.
fn post_multipart(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
                name, filename
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri("/execute-with-files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn wait_terminal(app: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let (status, json) = send(app, get(&format!("/status/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        if !matches!(json["status"].as_str(), Some("pending") | Some("running")) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} did not finish", id);
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_health_endpoint() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::default(), uploads.path());

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["docker"], true);
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::default(), uploads.path());

    let (status, json) = send(&app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    let endpoints = json["endpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "POST /execute"));
}

#[tokio::test]
async fn test_execute_then_poll_status() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::new("hi\n"), uploads.path());

    let (status, json) = send(
        &app,
        post_json("/execute", json!({"code": "print('hi')", "timeout": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Code submitted for execution");
    let id = json["execution_id"].as_str().unwrap().to_string();

    let result = wait_terminal(&app, &id).await;
    assert_eq!(result["status"], "completed");
    assert_eq!(result["output"], "hi\n");
    assert_eq!(result["lines_of_code"], 1);
    assert_eq!(result["execution_id"], id.as_str());
    assert!(result["execution_time"].as_f64().is_some());
}

#[tokio::test]
async fn test_execute_timeout_reports_timeout_status() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(
        MockEngine::default().with_wait_delay(Duration::from_secs(30)),
        uploads.path(),
    );

    let (_, json) = send(
        &app,
        post_json("/execute", json!({"code": "import time; time.sleep(30)", "timeout": 1})),
    )
    .await;
    let id = json["execution_id"].as_str().unwrap().to_string();

    let result = wait_terminal(&app, &id).await;
    assert_eq!(result["status"], "timeout");
}

#[tokio::test]
async fn test_zero_timeout_is_rejected() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::default(), uploads.path());

    let (status, json) = send(
        &app,
        post_json("/execute", json!({"code": "print(1)", "timeout": 0})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_unknown_status_is_404() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::default(), uploads.path());

    let (status, json) = send(&app, get("/status/no-such-id")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["message"].as_str().unwrap().contains("no-such-id"));
}

#[tokio::test]
async fn test_execute_with_files() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::new("hi\n"), uploads.path());

    let (status, json) = send(
        &app,
        post_multipart(&[
            ("files", Some("main.py"), "import helper\nhelper.greet()\n"),
            ("files", Some("helper.py"), "def greet():\n    print('hi')\n"),
            ("entry_file", None, "main.py"),
            ("timeout", None, "5"),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["message"], "Project submitted for execution");
    let id = json["execution_id"].as_str().unwrap().to_string();

    let result = wait_terminal(&app, &id).await;
    assert_eq!(result["status"], "completed");
    assert_eq!(result["lines_of_code"], 4);

    for _ in 0..100 {
        if entries(uploads.path()) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(entries(uploads.path()), 0);
}

#[tokio::test]
async fn test_entry_file_must_be_uploaded() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::default(), uploads.path());

    let (status, json) = send(
        &app,
        post_multipart(&[
            ("files", Some("helper.py"), "X = 1\n"),
            ("entry_file", None, "main.py"),
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("main.py"));
    assert_eq!(entries(uploads.path()), 0);
}

#[tokio::test]
async fn test_upload_path_traversal_is_rejected() {
    let uploads = tempfile::tempdir().unwrap();
    let app = app(MockEngine::default(), uploads.path());

    let (status, _) = send(
        &app,
        post_multipart(&[
            ("files", Some("../escape.py"), "print('out')\n"),
            ("entry_file", None, "../escape.py"),
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(entries(uploads.path()), 0);
    assert!(!uploads.path().parent().unwrap().join("escape.py").exists());
}
