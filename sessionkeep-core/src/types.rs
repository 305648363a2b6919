//! Configuration data structures

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top level configuration for session persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionKeepConfig {
    pub store: StoreSettings,
    pub cookies: CookieSettings,
    pub local_storage: LocalStorageSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingConfig,
}

/// Settings shared by every backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Namespace for every client-side storage key
    pub app_prefix: String,
    /// Lifetime of a new session in seconds
    pub session_timeout_secs: u64,
    /// Upper bound for a single backend call
    pub backend_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub enabled: bool,
    /// Per-field cookies guarded by a keyed digest
    pub signed_enabled: bool,
    /// Signing secret; the signed cookie backend is unavailable without it
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite connection url, e.g. `sqlite:data/sessions.db`
    pub url: Option<String>,
    pub table: String,
    pub max_connections: u32,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
}
