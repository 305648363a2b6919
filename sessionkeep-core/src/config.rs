//! Configuration management

use crate::error::{ErrorContext, SessionKeepError, SessionKeepResult};
use crate::types::{
    CookieSettings, DatabaseSettings, LocalStorageSettings, SessionKeepConfig, StoreSettings,
};

use std::path::Path;
use std::time::Duration;

pub const DEFAULT_APP_PREFIX: &str = "iconnet_app";
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;
/// Upper bound for `store.session_timeout_secs`, ten years
pub const MAX_SESSION_TIMEOUT_SECS: u64 = 10 * 365 * 24 * 60 * 60;
pub const DEFAULT_SESSION_TABLE: &str = "cloud_user_sessions";

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            app_prefix: DEFAULT_APP_PREFIX.to_string(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            backend_timeout_ms: 3000,
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            signed_enabled: true,
            secret: None,
        }
    }
}

impl Default for LocalStorageSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            table: DEFAULT_SESSION_TABLE.to_string(),
            max_connections: 5,
            retry_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

impl StoreSettings {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl SessionKeepConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SessionKeepResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SessionKeepError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: SessionKeepConfig =
            toml::from_str(&content).map_err(|e| SessionKeepError::Config {
                message: format!("Failed to parse config: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("parse_toml")
                    .with_suggestion("Check TOML syntax in config file"),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SessionKeepResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SessionKeepError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| SessionKeepError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SessionKeepResult<()> {
        if self.store.app_prefix.trim().is_empty() {
            return Err(invalid("store.app_prefix must not be empty", "Set store.app_prefix"));
        }

        if self.store.session_timeout_secs == 0 {
            return Err(invalid(
                "store.session_timeout_secs must be greater than 0",
                "Set store.session_timeout_secs to a positive value",
            ));
        }

        if self.store.session_timeout_secs > MAX_SESSION_TIMEOUT_SECS {
            return Err(invalid(
                "store.session_timeout_secs exceeds ten years",
                "Pick a session lifetime of at most 315360000 seconds",
            ));
        }

        if self.store.backend_timeout_ms == 0 {
            return Err(invalid(
                "store.backend_timeout_ms must be greater than 0",
                "Set store.backend_timeout_ms to a positive value",
            ));
        }

        if !is_plain_identifier(&self.database.table) {
            return Err(invalid(
                "database.table must be a plain SQL identifier",
                "Use letters, digits and underscores only",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(invalid(
                "database.max_connections must be greater than 0",
                "Set database.max_connections to a positive value",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str, suggestion: &str) -> SessionKeepError {
    SessionKeepError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
