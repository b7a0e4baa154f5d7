//! HTTP API: REST endpoints plus the SSE progress stream.

pub mod auth;
pub mod health;
pub mod library;
pub mod recommendations;

pub use auth::auth_routes;
pub use health::health_routes;
pub use library::library_routes;
pub use recommendations::recommendation_routes;
