//! Background TTL sweeper (§4.5 `cleanupExpiredRuns`, §10.6): a plain
//! `tokio::time::interval` loop, spawned alongside the HTTP server the
//! same way `insanalamin-mechaway`'s axum backend spawns its cron
//! scheduler in `server.rs`.

use std::sync::Arc;
use std::time::Duration;

use crate::service::RunService;

pub fn spawn(service: Arc<RunService>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = service.cleanup_expired_runs().await;
            if expired > 0 {
                log::info!("sweeper pass expired {expired} runs");
            }
        }
    });
}
