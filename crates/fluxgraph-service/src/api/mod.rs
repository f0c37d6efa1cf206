//! HTTP API layer (§6.1): one module per resource, each exposing a
//! `routes()` builder merged into the top-level router in `main.rs`.

pub mod flows;
pub mod runs;
pub mod schema;

pub use flows::routes as flow_routes;
pub use runs::routes as run_routes;
pub use schema::routes as schema_routes;
