//! SessionKeep Store - multi-backend login session persistence
//!
//! A login session is written to every available medium (cookies, local
//! storage, a SQLite table, the in-process scope) and read back from the
//! strongest one that still holds a valid record.
//!
//! ```no_run
//! use sessionkeep_store::{BackendProbe, SessionScope, SessionStore, SystemClock};
//! use sessionkeep_core::SessionKeepConfig;
//! use std::sync::Arc;
//!
//! # async fn run() -> sessionkeep_store::SessionResult<()> {
//! let config = SessionKeepConfig::default();
//! let store = SessionStore::from_config(&config, BackendProbe::new(), Arc::new(SystemClock)).await?;
//!
//! let mut scope = SessionScope::new();
//! store.save(&mut scope, "alice", "alice@example.com", "Admin").await?;
//! assert!(store.is_authenticated(&mut scope).await);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod clock;
pub mod codec;
pub mod error;
pub mod policy;
pub mod record;
pub mod registry;
pub mod scope;
pub mod store;

pub use backend::{BackendDescriptor, Capability, SessionBackend};
pub use client::{CookieJar, LocalStorageArea, MemoryCookieJar, MemoryLocalStorage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BackendError, SessionResult, StoreError};
pub use policy::{generate_session_id, is_valid, SessionPolicy, SESSION_ID_LEN};
pub use record::SessionRecord;
pub use registry::{BackendProbe, Registry};
pub use scope::SessionScope;
pub use store::{
    BackendOutcome, BackendStatus, LoadReport, SaveOutcome, SessionStore, StoreResult,
};
