pub mod health;
pub mod jobs;
pub mod system;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /separate                                   submit a job (POST)
/// /progress/{job_id}                          poll progress
/// /result/{job_id}                            poll result
/// /download/{job_id}/{filename}               download a stem
///
/// /models                                     list separation models
/// /check-installation                         probe external tools
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(jobs::router())
        .merge(system::router())
}
