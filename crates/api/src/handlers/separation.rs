//! Handlers for submitting separation jobs and polling their state.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use stemsep_core::error::{CoreError, EngineError};
use stemsep_core::job::{ProgressView, ResultView};
use stemsep_core::supervisor::UploadGuard;
use stemsep_core::types::JobId;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upload::validate_upload_name;

/// Response of a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub message: &'static str,
    pub status: &'static str,
}

/// Parse a job id from the path. Malformed ids are reported as unknown jobs.
pub(crate) fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: raw.to_string(),
        })
    })
}

/// POST /api/separate
///
/// Multipart body with a required `file` part and an optional `model` text
/// part. Stages the upload and starts a job; returns before separation runs.
pub async fn separate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<SubmitResponse>> {
    let id = JobId::new();
    let mut upload: Option<UploadGuard> = None;
    let mut model: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                if upload.is_some() {
                    return Err(invalid("Only one file part is allowed"));
                }
                let filename = validate_upload_name(field.file_name().unwrap_or(""))
                    .map_err(CoreError::from)?;

                let upload_dir = &state.engine.config().upload_dir;
                tokio::fs::create_dir_all(upload_dir)
                    .await
                    .map_err(|e| AppError::InternalError(e.to_string()))?;

                let path = state.engine.upload_path(id, &filename);
                let guard = UploadGuard::new(path.clone());
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| AppError::InternalError(e.to_string()))?;

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| AppError::InternalError(e.to_string()))?;
                }
                file.flush()
                    .await
                    .map_err(|e| AppError::InternalError(e.to_string()))?;

                upload = Some(guard);
            }
            "model" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                model = Some(text);
            }
            _ => {} // ignore unknown fields
        }
    }

    let upload = upload.ok_or_else(|| invalid("No file part"))?;
    let input = upload
        .path()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| AppError::InternalError("upload path missing".into()))?;

    // Until `submit` succeeds the guard still owns the staged file.
    let handle = state.engine.submit(id, input, model).await?;
    upload.release();
    tracing::info!(job_id = %handle.id(), "Separation job accepted");

    Ok(Json(SubmitResponse {
        job_id: id,
        message: "Separation process started",
        status: "processing",
    }))
}

/// Upload rejection, reported as a validation error.
fn invalid(msg: &str) -> AppError {
    AppError::Core(EngineError::InputValidation(msg.to_string()).into())
}

/// GET /api/progress/{job_id}
pub async fn progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<ProgressView>> {
    let id = parse_job_id(&job_id)?;
    let view = state.engine.progress(id).await.ok_or(AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: job_id,
    }))?;
    Ok(Json(view))
}

/// GET /api/result/{job_id}
///
/// 200 when the job succeeded, 500 when it failed and 202 while it runs.
pub async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<(StatusCode, Json<ResultView>)> {
    let id = parse_job_id(&job_id)?;
    let view = state.engine.result(id).await.ok_or(AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: job_id,
    }))?;

    let status = match &view {
        ResultView::Succeeded { .. } => StatusCode::OK,
        ResultView::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ResultView::Pending { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(view)))
}
