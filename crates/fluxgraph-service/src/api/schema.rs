//! `/api/v1/flows/{slug}/schema` (§4.6): the generated OpenAPI document.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::Value;

use crate::app_state::AppState;
use crate::auth::{authenticate, require_scope, SCOPE_FLOW_READ};
use crate::error::{Result, ServiceError};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/flows/:slug/schema", get(get_schema))
}

async fn get_schema(State(state): State<AppState>, Path(slug): Path<String>, headers: HeaderMap) -> Result<Json<Value>> {
    let ctx = authenticate(&headers, &state.config)?;
    require_scope(&ctx, SCOPE_FLOW_READ)?;

    let (flow, api_config) = state
        .flows
        .get(&slug)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("flow '{slug}'")))?;

    let base_url = format!("http://{}", state.config.bind_addr);
    let document = fluxgraph_engine::generate_openapi(&flow, &api_config, Some(&base_url));
    Ok(Json(document))
}
