#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use stemsep_api::config::ServerConfig;
use stemsep_api::router::build_app_router;
use stemsep_api::state::AppState;
use stemsep_core::config::{EngineConfig, ToolchainConfig};
use stemsep_core::engine::SeparationEngine;

const BOUNDARY: &str = "stemsep-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 10 * 1024 * 1024,
    }
}

/// Write an executable shell script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Engine configuration rooted in `dir`, with `separator_body` as the fake
/// separator and `sh` standing in for the companion codec.
pub fn engine_config(dir: &Path, separator_body: &str) -> EngineConfig {
    EngineConfig {
        upload_dir: dir.join("uploads"),
        output_dir: dir.join("outputs"),
        toolchain: ToolchainConfig {
            separator_bin: write_script(dir, "separator", separator_body),
            companion_bin: "sh".to_string(),
            companion_env: "FFMPEG_PATH".to_string(),
            fallback_dirs: vec![],
        },
        transcoder_bin: dir.join("missing-transcoder"),
        poll_interval: Duration::from_millis(20),
        drain_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    }
}

/// Build the full application router with all middleware layers, exactly
/// as `main.rs` does.
pub fn build_test_app(engine_config: EngineConfig) -> Router {
    let config = test_config();
    let state = AppState::new(SeparationEngine::new(engine_config), config.clone());
    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// POST a multipart upload. `file` is `(filename, bytes)`.
pub async fn post_separate(
    app: Router,
    file: Option<(&str, &[u8])>,
    model: Option<&str>,
) -> Response {
    let mut body = Vec::new();
    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(model) = model {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\n{model}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post("/api/separate")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Poll `/api/result/{job_id}` until the job leaves the pending state.
pub async fn wait_for_result(app: &Router, job_id: &str) -> (StatusCode, serde_json::Value) {
    for _ in 0..500 {
        let response = get(app.clone(), &format!("/api/result/{job_id}")).await;
        if response.status() != StatusCode::ACCEPTED {
            let status = response.status();
            return (status, body_json(response).await);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not finish in time");
}
