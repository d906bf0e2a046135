use std::path::Path;
use std::sync::Arc;

use assert_fs::TempDir;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use deskexec::server::{AppState, CancelResponse, ErrorBody, ExecutionList, create_router};
use deskexec_runner::{AllowListPolicy, Launcher, ProjectRoot};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use tower::ServiceExt;

fn app(root: &Path) -> (Router, Launcher) {
    let launcher = Launcher::new(
        Arc::new(AllowListPolicy::new(["pwd", "echo", "sleep", "cat"])),
        ProjectRoot::new(root),
    );
    (create_router(AppState::new(launcher.clone())), launcher)
}

fn launch_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/exec")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

fn cancel_request(query: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/api/exec{query}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn error_message(response: axum::response::Response) -> String {
    let body: ErrorBody = serde_json::from_slice(&body_bytes(response).await).unwrap();
    body.error
}

#[tokio::test]
async fn launch_streams_output_with_execution_id() {
    let temp = TempDir::new().unwrap();
    let (app, launcher) = app(temp.path());

    let response = app.oneshot(launch_request(r#"{"command":"pwd"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let id = response.headers()["x-execution-id"].to_str().unwrap().to_owned();
    assert_eq!(id.len(), 36);

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(
        body,
        format!(
            "{}\n\nProcess exited with code 0\n",
            launcher.project_root().path().display()
        )
    );
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn disallowed_command_is_a_bad_request() {
    let temp = TempDir::new().unwrap();
    let (app, launcher) = app(temp.path());

    let response = app
        .oneshot(launch_request(r#"{"command":"rm -rf /"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(response).await;
    assert!(message.starts_with("\"rm\" is not permitted"), "{message}");
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn metacharacters_are_a_bad_request() {
    let temp = TempDir::new().unwrap();
    let (app, _) = app(temp.path());

    let response = app
        .oneshot(launch_request(r#"{"command":"echo hi; cat /etc/passwd"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(response).await.contains("forbidden"));
}

#[tokio::test]
async fn escaping_cwd_is_a_bad_request() {
    let temp = TempDir::new().unwrap();
    let (app, _) = app(temp.path());

    let response = app
        .oneshot(launch_request(r#"{"command":"pwd","cwd":"../../.."}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(response).await.contains("escapes the project root"));
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let temp = TempDir::new().unwrap();
    let (app, launcher) = app(temp.path());

    for body in ["{not json", r#"{"command":null}"#, r#"{"command":42}"#] {
        let response = app.clone().oneshot(launch_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert!(!error_message(response).await.is_empty(), "body {body}");
    }
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn missing_command_is_required() {
    let temp = TempDir::new().unwrap();
    let (app, launcher) = app(temp.path());

    for body in ["{}", r#"{"cwd":"src"}"#, r#"{"command":"   "}"#] {
        let response = app.clone().oneshot(launch_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert_eq!(error_message(response).await, "Command is required");
    }
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn cancel_reports_success_exactly_once() {
    let temp = TempDir::new().unwrap();
    let (app, launcher) = app(temp.path());

    let launched = app
        .clone()
        .oneshot(launch_request(r#"{"command":"sleep 30"}"#))
        .await
        .unwrap();
    assert_eq!(launched.status(), StatusCode::OK);
    let id = launched.headers()["x-execution-id"].to_str().unwrap().to_owned();

    let first = app
        .clone()
        .oneshot(cancel_request(&format!("?id={id}")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body: CancelResponse = serde_json::from_slice(&body_bytes(first).await).unwrap();
    assert_eq!(body, CancelResponse { success: true });

    let second = app
        .clone()
        .oneshot(cancel_request(&format!("?id={id}")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        error_message(second).await,
        "command not found or already finished"
    );

    let output = String::from_utf8(body_bytes(launched).await).unwrap();
    assert_eq!(output, "\nCommand cancelled\n");
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn cancel_without_id_is_a_bad_request() {
    let temp = TempDir::new().unwrap();
    let (app, _) = app(temp.path());

    for query in ["", "?id=", "?id=%20%20"] {
        let response = app.clone().oneshot(cancel_request(query)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query {query:?}");
    }
}

#[tokio::test]
async fn cancel_unknown_id_is_not_found() {
    let temp = TempDir::new().unwrap();
    let (app, _) = app(temp.path());

    let response = app.oneshot(cancel_request("?id=unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lists_running_executions() {
    let temp = TempDir::new().unwrap();
    let (app, launcher) = app(temp.path());

    let launched = app
        .clone()
        .oneshot(launch_request(r#"{"command":"sleep 30"}"#))
        .await
        .unwrap();
    let id = launched.headers()["x-execution-id"].to_str().unwrap().to_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/exec")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list: ExecutionList = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let [running] = list.executions.as_slice() else {
        panic!("expected one execution, got {:?}", list.executions);
    };
    assert_eq!(running.id.as_str(), id);
    assert_eq!(running.command, "sleep 30");

    assert_eq!(launcher.registry().terminate_all(), 1);
    drop(launched);
}

#[tokio::test]
async fn health_reports_ok() {
    let temp = TempDir::new().unwrap();
    let (app, _) = app(temp.path());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}
