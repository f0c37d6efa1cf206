//! `/api/v1/flows/{slug}/runs/{runId}` (§6.1, §6.4) and cancellation.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{delete, get};
use axum::Router;

use crate::app_state::AppState;
use crate::auth::{authenticate, require_scope, SCOPE_RUN_READ};
use crate::error::{Result, ServiceError};
use crate::run::Run;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/flows/:slug/runs/:run_id", get(get_run))
        .route("/api/v1/flows/:slug/runs/:run_id", delete(cancel_run))
}

async fn get_run(State(state): State<AppState>, Path((_slug, run_id)): Path<(String, String)>, headers: HeaderMap) -> Result<Json<Run>> {
    let ctx = authenticate(&headers, &state.config)?;
    require_scope(&ctx, SCOPE_RUN_READ)?;

    let run = state
        .service
        .get_run(&run_id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("run '{run_id}'")))?;
    Ok(Json(run))
}

async fn cancel_run(State(state): State<AppState>, Path((_slug, run_id)): Path<(String, String)>, headers: HeaderMap) -> Result<Json<Run>> {
    let ctx = authenticate(&headers, &state.config)?;
    require_scope(&ctx, SCOPE_RUN_READ)?;

    if !state.service.cancel_run(&run_id).await {
        return Err(ServiceError::NotFound(format!("run '{run_id}' not cancellable")));
    }
    let run = state
        .service
        .get_run(&run_id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("run '{run_id}'")))?;
    Ok(Json(run))
}
