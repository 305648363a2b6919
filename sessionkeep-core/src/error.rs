//! Error taxonomy shared by every sessionkeep crate
//!
//! Variants raised on purpose carry an [`ErrorContext`], so a log line can be
//! traced back to the component and call that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type SessionKeepResult<T> = Result<T, SessionKeepError>;

pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Where and when an error was raised, plus hints for the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlation id, unique per error
    pub error_id: String,
    pub occurred_at: DateTime<Utc>,
    pub component: String,
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            component: component.into(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(self, operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..self
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, hint: impl Into<String>) -> Self {
        self.recovery_suggestions.push(hint.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum SessionKeepError {
    /// A storage medium failed in a way the caller has to hear about
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    /// Caller input rejected before any medium was touched
    #[error("Invalid {}: {message}", .field.as_deref().unwrap_or("input"))]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("{operation} did not finish within {duration_ms} ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionKeepError {
    pub fn storage(
        message: impl Into<String>,
        component: &str,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source,
            context: ErrorContext::new(component)
                .with_suggestion("Check that the session database is reachable"),
        }
    }

    pub fn config(message: impl Into<String>, component: &str) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component)
                .with_suggestion("Run 'sessionkeep init-config' to write a default config"),
        }
    }

    pub fn validation(message: impl Into<String>, field: &str, component: &str) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.to_owned()),
            context: ErrorContext::new(component),
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Storage { context, .. }
            | Self::Config { context, .. }
            | Self::Validation { context, .. }
            | Self::Timeout { context, .. } => Some(context),
            Self::Io(_) | Self::Serialization(_) => None,
        }
    }

    /// Whether trying the same call again can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }

    /// Suggested pause before a retry, `None` when retrying is pointless
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Storage { .. } | Self::Io(_) => Some(200),
            // 100..=1000 ms
            Self::Timeout { duration_ms, .. } => Some((*duration_ms).clamp(100, 1000)),
            _ => None,
        }
    }

    /// Emit the error once, at `warn` when recoverable and `error` otherwise.
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str()).unwrap_or("-");
        let component = self.context().map(|c| c.component.as_str()).unwrap_or("-");

        if self.is_recoverable() {
            warn!(error_id, component, error = %self, "Recoverable sessionkeep error");
        } else {
            error!(error_id, component, error = %self, "Sessionkeep error");
        }
    }
}

/// `storage_error!(message, component[, source])`
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::SessionKeepError::storage($msg, $component, None)
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SessionKeepError::storage($msg, $component, Some(Box::new($source)))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::SessionKeepError::config($msg, $component)
    };
}

/// `validation_error!(message, field, component)`
#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::SessionKeepError::validation($msg, $field, $component)
    };
}
