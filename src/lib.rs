pub mod auth;
pub mod config;
pub mod error;
pub mod feeds;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod pages;
pub mod rate_limit;
pub mod render;
pub mod repo;
pub mod routes;
pub mod security;
pub mod template;

// Re-export commonly used items for tests / external users
pub use config::Settings;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
