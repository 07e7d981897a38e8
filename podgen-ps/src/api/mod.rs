//! HTTP API handlers for podgen-ps

pub mod auth;
pub mod health;
pub mod progress;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use progress::{progress_stream, publish_progress};
