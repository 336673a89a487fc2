//! Integration tests for job submission, polling and download.

mod common;

use axum::http::StatusCode;
use common::{body_bytes, body_json, get, post_separate, wait_for_result};

/// Writes two model-decorated stems, like the real separator does.
const SEPARATOR_OK: &str = r#"out="${2#--output_dir=}"
model="${3#--model_filename=}"
token="${model%.onnx}"
echo "Loading model $model"
printf pcm > "$out/${token}_song (Vocals).wav"
printf pcm > "$out/${token}_song (Instrumental).wav"
echo "Saving output"
"#;

// ---------------------------------------------------------------------------
// Test: unknown and malformed job ids return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::engine_config(dir.path(), "exit 0\n"));

    let response = get(
        app.clone(),
        "/api/progress/9b2f4c1e-0000-4000-8000-000000000000",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = get(app.clone(), "/api/result/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(app, "/api/download/not-a-uuid/a.wav").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: upload validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_file_part_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::engine_config(dir.path(), "exit 0\n"));

    let response = post_separate(app, None, Some("M.onnx")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No file part");
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::engine_config(dir.path(), "exit 0\n"));

    let response = post_separate(app, Some(("", b"ID3")), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No selected file");
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn disallowed_extension_is_rejected_and_nothing_is_staged() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::engine_config(dir.path(), "exit 0\n");
    let uploads = config.upload_dir.clone();
    let app = common::build_test_app(config);

    let response = post_separate(app.clone(), Some(("notes.txt", b"hello")), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("File type not allowed"));
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let health = body_json(get(app, "/health").await).await;
    assert_eq!(health["jobs"], 0);
    let staged = std::fs::read_dir(&uploads).map(|d| d.count()).unwrap_or(0);
    assert_eq!(staged, 0);
}

// ---------------------------------------------------------------------------
// Test: successful job end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_job_reports_normalized_files_and_serves_them() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::engine_config(dir.path(), SEPARATOR_OK);
    let uploads = config.upload_dir.clone();
    let app = common::build_test_app(config);

    let response = post_separate(app.clone(), Some(("My Song.mp3", b"ID3")), Some("M.onnx")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "processing");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let (status, result) = wait_for_result(&app, &job_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);
    assert_eq!(result["message"], "Separation completed successfully");
    assert_eq!(
        result["output_files"],
        serde_json::json!(["song-Instrumental.wav", "song-Vocals.wav"])
    );

    let progress = body_json(get(app.clone(), &format!("/api/progress/{job_id}")).await).await;
    assert_eq!(progress["progress"], 100);
    assert_eq!(progress["status"], "Complete");
    assert_eq!(progress["complete"], true);
    assert!(progress["error"].is_null());

    // The upload is removed once the job is terminal.
    assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);

    let response = get(app.clone(), &format!("/api/download/{job_id}/song-Vocals.wav")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "audio/wav");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"song-Vocals.wav\""
    );
    assert_eq!(headers["x-content-type-options"], "nosniff");
    // The CORS layer owns this header and lowercases its value.
    assert!(headers["access-control-expose-headers"]
        .to_str()
        .unwrap()
        .eq_ignore_ascii_case("content-disposition"));
    assert_eq!(body_bytes(response).await, b"pcm");

    let response = get(app, &format!("/api/download/{job_id}/..%2F..%2Fsecret.wav")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: conversion on download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_converts_with_transcoder_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::engine_config(dir.path(), SEPARATOR_OK);
    config.transcoder_bin = common::write_script(
        dir.path(),
        "ffmpeg",
        "for last; do :; done\nprintf MP3DATA > \"$last\"\n",
    );
    let scratch = dir.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    config.scratch_dir = Some(scratch.clone());
    let app = common::build_test_app(config);
    let scratch_files = || std::fs::read_dir(&scratch).unwrap().count();

    let json = body_json(post_separate(app.clone(), Some(("song.wav", b"RIFF")), Some("M.onnx")).await).await;
    let job_id = json["job_id"].as_str().unwrap().to_string();
    let (status, _) = wait_for_result(&app, &job_id).await;
    assert_eq!(status, StatusCode::OK);

    let response = get(
        app.clone(),
        &format!("/api/download/{job_id}/song-Vocals.wav?format=mp3"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"song-Vocals.mp3\""
    );
    // The converted file lives exactly as long as the response body.
    assert_eq!(scratch_files(), 1);
    assert_eq!(body_bytes(response).await, b"MP3DATA");
    assert_eq!(scratch_files(), 0);

    // Unknown formats are ignored and the original is served.
    let response = get(
        app,
        &format!("/api/download/{job_id}/song-Vocals.wav?format=opus"),
    )
    .await;
    assert_eq!(response.headers()["content-type"], "audio/wav");
    assert_eq!(body_bytes(response).await, b"pcm");
    assert_eq!(scratch_files(), 0);
}

// ---------------------------------------------------------------------------
// Test: failing separator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_returns_500_with_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::engine_config(
        dir.path(),
        "echo 'decode error' >&2\nexit 1\n",
    ));

    let json = body_json(post_separate(app.clone(), Some(("bad.flac", b"fLaC")), None).await).await;
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let (status, result) = wait_for_result(&app, &job_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("decode error"));

    let progress = body_json(get(app, &format!("/api/progress/{job_id}")).await).await;
    assert_eq!(progress["progress"], 0);
    assert_eq!(progress["status"], "Error");
    assert_eq!(progress["complete"], true);
}

// ---------------------------------------------------------------------------
// Test: pending job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_job_returns_202() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::engine_config(dir.path(), "sleep 2\nexit 1\n"));

    let json = body_json(post_separate(app.clone(), Some(("slow.ogg", b"OggS")), None).await).await;
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let response = get(app, &format!("/api/result/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Job still in progress");
    assert!(json["progress"].as_u64().unwrap() < 100);
}
