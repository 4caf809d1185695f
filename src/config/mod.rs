//! Configuration module.
//!
//! Provides `AppConfig` (backend URL and input device), `AppPaths` for the
//! platform config directory, and TOML loading via `AppConfig::load`.  The
//! file is written by hand; the client never saves it.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, ServerConfig, DEFAULT_SERVER_URL};
