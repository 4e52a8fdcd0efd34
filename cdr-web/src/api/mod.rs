//! HTTP API handlers for cdr-web

pub mod health;
pub mod preview;
pub mod runs;
pub mod settings;
mod upload;

pub use health::health_routes;
pub use preview::preview_routes;
pub use runs::run_routes;
pub use settings::settings_routes;
