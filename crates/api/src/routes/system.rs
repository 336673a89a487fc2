use axum::routing::get;
use axum::Router;

use crate::handlers::system;
use crate::state::AppState;

/// Toolchain routes, merged into `/api`.
///
/// ```text
/// GET /models                                 model list (?refresh=true)
/// GET /check-installation                     dependency report
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(system::list_models))
        .route("/check-installation", get(system::check_installation))
}
