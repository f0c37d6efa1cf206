//! Shared application state, cloned into every axum handler — the same
//! shape `insanalamin-mechaway`'s axum backend uses for its own
//! `AppState` (`storage`, `registry`, `scheduler`).

use std::sync::Arc;

use fluxgraph_engine::FlowScheduler;

use crate::config::Config;
use crate::flow_registry::FlowRegistry;
use crate::rate_limit::RateLimiter;
use crate::run::RunStore;
use crate::service::RunService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub flows: Arc<FlowRegistry>,
    pub runs: Arc<dyn RunStore>,
    pub scheduler: Arc<FlowScheduler>,
    pub service: Arc<RunService>,
    pub rate_limiter: Arc<RateLimiter>,
}
