//! Credential check and scope enforcement (§6.1, §7 `auth` kind).
//!
//! No identity provider is part of this workspace; callers present an
//! opaque bearer token or `X-API-Key` header and are granted a fixed
//! scope set. When `public_access` is enabled, unauthenticated callers
//! receive the default scope set named in §6.1 instead of a 401.

use std::collections::HashSet;

use axum::http::HeaderMap;

use crate::config::Config;
use crate::error::ServiceError;

pub const SCOPE_FLOW_READ: &str = "flow:read";
pub const SCOPE_FLOW_EXECUTE: &str = "flow:execute";
pub const SCOPE_FLOW_EXECUTE_ASYNC: &str = "flow:execute:async";
pub const SCOPE_RUN_READ: &str = "run:read";

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject_id: String,
    pub scopes: HashSet<String>,
    /// §4.5.3: an authenticated key may carry its own TTL ceiling.
    pub max_ttl_secs: Option<u64>,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    fn default_public() -> Self {
        Self {
            subject_id: "anonymous".to_string(),
            scopes: [SCOPE_FLOW_READ, SCOPE_FLOW_EXECUTE, SCOPE_FLOW_EXECUTE_ASYNC, SCOPE_RUN_READ]
                .into_iter()
                .map(str::to_string)
                .collect(),
            max_ttl_secs: None,
        }
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    let auth = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok())?;
    auth.strip_prefix("Bearer ").map(str::to_string)
}

/// Any non-empty token is accepted and granted the full scope set: key
/// issuance and per-key scope restriction are management-plane concerns
/// explicitly out of scope (§6.1).
pub fn authenticate(headers: &HeaderMap, config: &Config) -> Result<AuthContext, ServiceError> {
    match extract_token(headers) {
        Some(token) if !token.is_empty() => Ok(AuthContext {
            subject_id: token,
            scopes: [SCOPE_FLOW_READ, SCOPE_FLOW_EXECUTE, SCOPE_FLOW_EXECUTE_ASYNC, SCOPE_RUN_READ]
                .into_iter()
                .map(str::to_string)
                .collect(),
            max_ttl_secs: None,
        }),
        _ if config.public_access => Ok(AuthContext::default_public()),
        _ => Err(ServiceError::Unauthorized),
    }
}

pub fn require_scope(ctx: &AuthContext, scope: &str) -> Result<(), ServiceError> {
    if ctx.has_scope(scope) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(scope.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(public: bool) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".into(),
            default_ttl_secs: 60,
            max_ttl_secs: 600,
            sweeper_interval_secs: 60,
            worker_timeout_secs: 60,
            public_access: public,
        }
    }

    #[test]
    fn missing_credentials_rejected_without_public_access() {
        let headers = HeaderMap::new();
        assert!(matches!(authenticate(&headers, &config(false)), Err(ServiceError::Unauthorized)));
    }

    #[test]
    fn missing_credentials_fall_back_to_public_scopes() {
        let headers = HeaderMap::new();
        let ctx = authenticate(&headers, &config(true)).unwrap();
        assert!(ctx.has_scope(SCOPE_FLOW_READ));
    }

    #[test]
    fn bearer_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        let ctx = authenticate(&headers, &config(false)).unwrap();
        assert_eq!(ctx.subject_id, "abc123");
    }

    #[test]
    fn require_scope_rejects_missing_scope() {
        let ctx = AuthContext {
            subject_id: "x".into(),
            scopes: HashSet::new(),
            max_ttl_secs: None,
        };
        assert!(require_scope(&ctx, SCOPE_RUN_READ).is_err());
    }
}
