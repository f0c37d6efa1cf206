//! Environment-driven configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub sweeper_interval_secs: u64,
    pub worker_timeout_secs: u64,
    /// When true, unauthenticated callers receive the default scope set
    /// `{flow:read, flow:execute, flow:execute:async, run:read}` (§6.1).
    pub public_access: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("FLUXGRAPH_BIND_ADDR", "0.0.0.0:8080"),
            default_ttl_secs: env_parsed_or("FLUXGRAPH_DEFAULT_TTL_SECS", 3600),
            max_ttl_secs: env_parsed_or("FLUXGRAPH_MAX_TTL_SECS", 86_400),
            sweeper_interval_secs: env_parsed_or("FLUXGRAPH_SWEEPER_INTERVAL_SECS", 60),
            worker_timeout_secs: env_parsed_or("FLUXGRAPH_WORKER_TIMEOUT_SECS", 60),
            public_access: env_parsed_or("FLUXGRAPH_PUBLIC_ACCESS", false),
        }
    }

    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper_interval_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        std::env::remove_var("FLUXGRAPH_DEFAULT_TTL_SECS");
        let config = Config::from_env();
        assert_eq!(config.default_ttl_secs, 3600);
    }
}
