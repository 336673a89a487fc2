use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use stemsep_core::models::ModelList;
use stemsep_core::toolchain::InstallationReport;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ModelsQuery {
    /// Re-run the separator's model listing instead of using the cache.
    #[serde(default)]
    pub refresh: bool,
}

/// GET /api/models?refresh=true
///
/// Always 200: a broken separator yields a fallback list with a `note`.
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ModelsQuery>,
) -> Json<ModelList> {
    Json(state.engine.models(query.refresh).await)
}

/// GET /api/check-installation
pub async fn check_installation(State(state): State<AppState>) -> Json<InstallationReport> {
    let report = state.engine.check_installation().await;
    if !report.all_installed {
        tracing::warn!(message = %report.message, "Dependency check found missing tools");
    }
    Json(report)
}
