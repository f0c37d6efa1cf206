//! In-memory flow catalog: the deployed `Flow` definitions and their
//! per-flow API configuration (§3 Flow-API config, §4.6), keyed by slug.
//!
//! Mirrors `InMemoryRunStore`'s shape — a single `RwLock<HashMap<_, _>>`
//! — for the same reason: flow CRUD and persistence are management-plane
//! concerns out of scope here, so the registry only needs to answer
//! "what is deployed right now".

use std::collections::HashMap;
use std::sync::Arc;

use fluxgraph_engine::{derive_slug, Flow, FlowApiConfig};
use tokio::sync::RwLock;

pub struct FlowEntry {
    pub flow: Flow,
    pub api_config: FlowApiConfig,
}

#[derive(Default)]
pub struct FlowRegistry {
    by_slug: RwLock<HashMap<String, FlowEntry>>,
}

impl FlowRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, flow: Flow, api_config: Option<FlowApiConfig>) -> String {
        let slug = derive_slug(&flow.name);
        let api_config = api_config.unwrap_or_else(|| FlowApiConfig {
            slug: slug.clone(),
            title: flow.name.clone(),
            description: None,
            api_version: flow.version.clone(),
            default_ttl_secs: 3600,
            max_ttl_secs: 86_400,
            timeout_ms: 60_000,
        });
        self.by_slug.write().await.insert(slug.clone(), FlowEntry { flow, api_config });
        slug
    }

    pub async fn get(&self, slug: &str) -> Option<(Flow, FlowApiConfig)> {
        self.by_slug.read().await.get(slug).map(|entry| (entry.flow.clone(), entry.api_config.clone()))
    }

    pub async fn list_slugs(&self) -> Vec<String> {
        self.by_slug.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(name: &str) -> Flow {
        Flow {
            id: "f1".into(),
            name: name.into(),
            version: "1".into(),
            nodes: vec![],
            edges: vec![],
            created_at: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn register_then_get_round_trips_by_derived_slug() {
        let registry = FlowRegistry::new();
        let slug = registry.register(flow("My Flow!!"), None).await;
        assert_eq!(slug, "my-flow");
        let (found, _config) = registry.get(&slug).await.unwrap();
        assert_eq!(found.name, "My Flow!!");
    }

    #[tokio::test]
    async fn unknown_slug_returns_none() {
        let registry = FlowRegistry::new();
        assert!(registry.get("nope").await.is_none());
    }
}
