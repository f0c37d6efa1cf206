//! `/api/v1/flows/{slug}/run` and `/schema` (§6.1, §4.6).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::auth::{authenticate, require_scope, SCOPE_FLOW_EXECUTE, SCOPE_FLOW_EXECUTE_ASYNC};
use crate::error::{ServiceError, Result};
use crate::rate_limit::Decision;
use crate::service::{ExecuteOptions, TtlBounds};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/flows/:slug/run", post(run_flow))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunOptions {
    timeout: Option<u64>,
    ttl: Option<u64>,
    r#async: bool,
    webhook: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default)]
    inputs: Value,
    #[serde(default)]
    options: RunOptions,
}

async fn run_flow(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RunRequest>,
) -> Result<Response> {
    let ctx = authenticate(&headers, &state.config)?;
    let decision = state.rate_limiter.check(&ctx.subject_id);
    if !decision.allowed {
        return Err(ServiceError::RateLimited { retry_after_secs: decision.reset_after_secs });
    }

    let scope = if body.options.r#async { SCOPE_FLOW_EXECUTE_ASYNC } else { SCOPE_FLOW_EXECUTE };
    require_scope(&ctx, scope)?;

    let (flow, api_config) = state
        .flows
        .get(&slug)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("flow '{slug}'")))?;

    let bounds = TtlBounds {
        default_ttl_secs: api_config.default_ttl_secs,
        max_ttl_secs: api_config.max_ttl_secs,
        auth_max_ttl_secs: ctx.max_ttl_secs,
    };
    let options = ExecuteOptions {
        ttl_secs: body.options.ttl,
        timeout_ms: body.options.timeout,
        webhook: body.options.webhook,
        flow_api_id: Some(api_config.slug.clone()),
        api_key_id: Some(ctx.subject_id.clone()),
        client_ip: None,
        user_agent: None,
    };

    let response = if body.options.r#async {
        let run_id = state.service.execute_flow_async(flow, body.inputs, options, bounds).await;
        Json(json!({ "id": run_id, "status": "pending" })).into_response()
    } else {
        let run = state.service.execute_flow_sync(flow, body.inputs, &options, &bounds).await?;
        Json(run).into_response()
    };

    Ok(with_rate_limit_headers(response, &decision))
}

pub fn with_rate_limit_headers(mut response: Response, decision: &Decision) -> Response {
    let headers = response.headers_mut();
    for (name, value) in [
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_after_secs.to_string()),
    ] {
        if let Ok(header_value) = value.parse() {
            headers.insert(name, header_value);
        }
    }
    response
}
