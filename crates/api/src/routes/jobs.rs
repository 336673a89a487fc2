use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{download, separation};
use crate::state::AppState;

/// Job routes, merged into `/api`.
///
/// ```text
/// POST /separate                              submit (multipart: file, model)
/// GET  /progress/{job_id}                     progress snapshot
/// GET  /result/{job_id}                       result (200 / 202 / 500)
/// GET  /download/{job_id}/{filename}          stream a stem (?format=)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/separate", post(separation::separate))
        .route("/progress/{job_id}", get(separation::progress))
        .route("/result/{job_id}", get(separation::result))
        .route("/download/{job_id}/{filename}", get(download::download))
}
