use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use codeden_lib::commands::AppState;
use codeden_lib::config::Config;
use codeden_lib::server::api_router;
use codeden_lib::services::{
    MemoryHistory, PathGuard, Retention, SupervisorOptions, TerminalSupervisor,
};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(password: Option<&str>) -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        root: dir.path().to_path_buf(),
        ..Config::default()
    };
    let guard = PathGuard::new(dir.path(), config.files.denied_paths.clone()).unwrap();
    let history = Arc::new(MemoryHistory::new(Retention {
        commands: 100,
        recent_files: 20,
    }));
    let supervisor = TerminalSupervisor::new(SupervisorOptions::new(
        false,
        config.terminal.port,
        "/bin/sh",
        dir.path().join(".codeden"),
    ));
    let state = Arc::new(AppState::new(guard, &config, history, supervisor));
    (dir, api_router(state, password.map(str::to_string)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn call(app: &Router, body: Value) -> (StatusCode, Value) {
    let request = Request::post("/api")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

#[tokio::test]
async fn write_read_delete_scenario() {
    let (_dir, app) = app(None);

    let (status, written) = call(
        &app,
        json!({"action": "write", "path": "notes.txt", "content": "hello"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(written["success"], true);
    assert_eq!(written["relative_path"], "/notes.txt");
    assert_eq!(written["size"], 5);

    let (_, file) = call(&app, json!({"action": "read", "path": "notes.txt"})).await;
    assert_eq!(file["success"], true);
    assert_eq!(file["content"], "hello");
    assert_eq!(file["is_binary"], false);
    assert_eq!(file["language"], "plaintext");
    assert_eq!(file["editable"], true);

    let (_, deleted) = call(&app, json!({"action": "delete", "path": "notes.txt"})).await;
    assert_eq!(deleted["success"], true);

    let (status, missing) = call(&app, json!({"action": "read", "path": "notes.txt"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["success"], false);
    assert_eq!(missing["code"], "not_found");
    assert_eq!(missing["error"], "File not found");
}

#[tokio::test]
async fn binary_content_round_trips_as_base64() {
    let (_dir, app) = app(None);
    // 0x00 0x01 0xff 0x10
    let (status, _) = call(
        &app,
        json!({"action": "write", "path": "blob.bin", "content": "AAH/EA==", "base64": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, file) = call(&app, json!({"action": "read", "path": "blob.bin"})).await;
    assert_eq!(file["is_binary"], true);
    assert_eq!(file["editable"], false);
    assert_eq!(file["content_base64"], "AAH/EA==");
    assert_eq!(file["content"], Value::Null);
}

#[tokio::test]
async fn every_operation_is_confined_to_root() {
    let (_dir, app) = app(None);
    call(&app, json!({"action": "write", "path": "a.txt", "content": "x"})).await;

    let escapes = [
        json!({"action": "list", "path": ".."}),
        json!({"action": "read", "path": "../outside.txt"}),
        json!({"action": "write", "path": "../escape.txt", "content": "x"}),
        json!({"action": "mkdir", "path": "../escape-dir"}),
        json!({"action": "delete", "path": "../escape.txt"}),
        json!({"action": "rename", "old_path": "a.txt", "new_path": "../b.txt"}),
        json!({"action": "rename", "old_path": "../b.txt", "new_path": "c.txt"}),
        json!({"action": "search", "query": "x", "path": ".."}),
        json!({"action": "exec", "command": "pwd", "cwd": ".."}),
        json!({"action": "list", "path": "/etc"}),
    ];
    for request in escapes {
        let (status, body) = call(&app, request.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{request}");
        assert_eq!(body["code"], "access_denied", "{request}");
    }
}

#[tokio::test]
async fn denylisted_segments_are_rejected() {
    let (dir, app) = app(None);
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".git/config"), "[core]").unwrap();

    let (status, body) = call(&app, json!({"action": "read", "path": ".git/config"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied: restricted path");
}

#[tokio::test]
async fn listings_order_and_parent_entry() {
    let (_dir, app) = app(None);
    call(&app, json!({"action": "mkdir", "path": "src/nested"})).await;
    call(&app, json!({"action": "write", "path": "B.txt", "content": ""})).await;
    call(&app, json!({"action": "write", "path": "a.txt", "content": ""})).await;

    let (_, root) = call(&app, json!({"action": "list"})).await;
    let names: Vec<_> = root["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["src", "a.txt", "B.txt"]);

    let (_, sub) = call(&app, json!({"action": "list", "path": "src"})).await;
    assert_eq!(sub["items"][0]["name"], "..");
    assert_eq!(sub["items"][0]["relative_path"], "/");
    assert_eq!(sub["items"][1]["name"], "nested");
}

#[tokio::test]
async fn repeated_mkdir_and_delete_fail() {
    let (_dir, app) = app(None);
    let (status, _) = call(&app, json!({"action": "mkdir", "path": "docs"})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, again) = call(&app, json!({"action": "mkdir", "path": "docs"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["code"], "already_exists");

    call(&app, json!({"action": "delete", "path": "docs"})).await;
    let (status, gone) = call(&app, json!({"action": "delete", "path": "docs"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(gone["code"], "not_found");

    let (status, root) = call(&app, json!({"action": "delete", "path": "."})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(root["code"], "forbidden");
}

#[cfg(unix)]
#[tokio::test]
async fn exec_returns_output_and_records_history() {
    let (_dir, app) = app(None);
    call(&app, json!({"action": "mkdir", "path": "src"})).await;

    let (_, result) = call(
        &app,
        json!({"action": "exec", "command": "basename \"$(pwd)\"", "cwd": "src"}),
    )
    .await;
    assert_eq!(result["success"], true);
    assert_eq!(result["output"], "src\n");
    assert_eq!(result["exit_code"], 0);

    let (_, failed) = call(&app, json!({"action": "exec", "command": "ls /nonexistent-dir"})).await;
    // The request succeeded; the command's own outcome is reported in place.
    assert_eq!(failed["success"], false);
    assert_ne!(failed["exit_code"], 0);
    assert!(!failed["error_output"].as_str().unwrap().is_empty());

    let (_, history) = call(&app, json!({"action": "history"})).await;
    assert_eq!(history["history"][0], "ls /nonexistent-dir");
    assert_eq!(history["history"][1], "basename \"$(pwd)\"");
}

#[tokio::test]
async fn terminal_actions_report_disabled_feature() {
    let (_dir, app) = app(None);
    let (_, status) = call(&app, json!({"action": "terminal_status"})).await;
    assert_eq!(status["running"], false);
    assert_eq!(status["enabled"], false);

    let (code, refused) = call(&app, json!({"action": "terminal_start"})).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(refused["code"], "feature_disabled");

    let (_, stopped) = call(&app, json!({"action": "terminal_stop"})).await;
    assert_eq!(stopped["success"], true);
    assert_eq!(stopped["stopped"], false);
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let (_dir, app) = app(None);
    let (status, body) = call(&app, json!({"action": "self_update"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request: Unknown action: self_update");

    let request = Request::post("/api").body(Body::from("not json")).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn password_is_required_when_configured() {
    let (_dir, app) = app(Some("s3cret"));

    let (status, body) = call(&app, json!({"action": "info"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let bearer = Request::post("/api")
        .header("authorization", "Bearer s3cret")
        .body(Body::from(json!({"action": "info"}).to_string()))
        .unwrap();
    let (status, info) = send(&app, bearer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["terminal_enabled"], false);

    let query = Request::post("/api?token=s3cret")
        .body(Body::from(json!({"action": "info"}).to_string()))
        .unwrap();
    assert_eq!(send(&app, query).await.0, StatusCode::OK);

    let wrong = Request::post("/api?token=guess")
        .body(Body::from(json!({"action": "info"}).to_string()))
        .unwrap();
    assert_eq!(send(&app, wrong).await.0, StatusCode::UNAUTHORIZED);
}
