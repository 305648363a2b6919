//! Backend adapters
//!
//! Each adapter wraps one physical medium and exposes save/load/clear for a
//! single session record. Faults come back as [`BackendError`] values; an
//! adapter never panics past its own boundary.

pub mod cookie;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod local_storage;
pub mod signed_cookie;
pub mod volatile;

pub use cookie::CookieBackend;
#[cfg(feature = "sqlite")]
pub use database::{DatabaseBackend, StoredSessionRow};
pub use local_storage::LocalStorageBackend;
pub use signed_cookie::SignedCookieBackend;
pub use volatile::VolatileBackend;

use crate::error::BackendError;
use crate::record::SessionRecord;
use crate::scope::SessionScope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Durability class of a medium. Declaration order is registry precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Survives reloads and is visible to the client runtime immediately
    DurableClient,
    /// Shared server-side store keyed by subject
    DurableServer,
    /// Current process only
    Volatile,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::DurableClient => "durable-client",
            Capability::DurableServer => "durable-server",
            Capability::Volatile => "volatile",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub capability: Capability,
    /// Established once when the registry probes the medium
    pub available: bool,
}

impl BackendDescriptor {
    pub fn new(name: &str, capability: Capability) -> Self {
        Self {
            name: name.to_string(),
            capability,
            available: true,
        }
    }
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn capability(&self) -> Capability {
        self.descriptor().capability
    }

    async fn save(
        &self,
        scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError>;

    /// `Ok(None)` covers both "nothing stored" and "stored payload did not decode".
    async fn load(&self, scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError>;

    async fn clear(&self, scope: &mut SessionScope, subject_hint: &str)
        -> Result<(), BackendError>;

    /// Drop every stored record that expired at or before `now`.
    ///
    /// Client and volatile media hold at most one record and have nothing
    /// to sweep, so the default removes nothing.
    async fn sweep_expired(&self, _now: DateTime<Utc>) -> Result<u64, BackendError> {
        Ok(0)
    }
}
