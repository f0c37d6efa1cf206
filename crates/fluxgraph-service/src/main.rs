//! FluxGraph run service binary: wires configuration, the in-memory run
//! store, the flow scheduler, and the HTTP surface together and serves.

use std::sync::Arc;

use axum::Router;
use fluxgraph_engine::{FlowScheduler, NullEventSink, ThreadSandbox};
use fluxgraph_service::app_state::AppState;
use fluxgraph_service::flow_registry::FlowRegistry;
use fluxgraph_service::rate_limit::RateLimiter;
use fluxgraph_service::run::InMemoryRunStore;
use fluxgraph_service::service::RunService;
use fluxgraph_service::{api, sweeper, Config};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Arc::new(Config::from_env());
    log::info!("starting fluxgraph-service bind_addr={}", config.bind_addr);

    let runs = InMemoryRunStore::new();
    let flows = FlowRegistry::new();
    let scheduler = Arc::new(FlowScheduler::new(Arc::new(ThreadSandbox::default()), Arc::new(NullEventSink)));
    let rate_limiter = Arc::new(RateLimiter::default());
    let service = Arc::new(RunService::new(runs.clone(), scheduler.clone()));

    sweeper::spawn(service.clone(), config.sweeper_interval());

    let state = AppState {
        config: config.clone(),
        flows,
        runs,
        scheduler,
        service,
        rate_limiter,
    };

    let app = Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(api::flow_routes())
        .merge(api::run_routes())
        .merge(api::schema_routes())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    log::info!("listening addr={}", config.bind_addr);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
