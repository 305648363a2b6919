//! Session Store - ordered fan-out over the registry
//!
//! `save` and `clear` reach every backend independently and aggregate the
//! outcomes. `load` walks the registry in precedence order, skips records
//! that fail the validity predicate, and copies a record recovered from a
//! lower tier back up to the tiers ahead of it.

use crate::backend::{Capability, SessionBackend};
use crate::clock::Clock;
use crate::error::{BackendError, SessionResult};
use crate::policy::{self, SessionPolicy};
use crate::record::SessionRecord;
use crate::registry::{BackendProbe, Registry};
use crate::scope::SessionScope;
use sessionkeep_core::{
    log_operation_start, log_operation_success, performance, validation_error, with_timeout,
};
use sessionkeep_core::SessionKeepConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Succeeded,
    Failed(BackendError),
}

/// Result of one backend call within a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutcome {
    pub backend: String,
    pub capability: Capability,
    pub status: BackendStatus,
}

impl BackendOutcome {
    pub fn is_success(&self) -> bool {
        self.status == BackendStatus::Succeeded
    }

    pub fn error(&self) -> Option<&BackendError> {
        match &self.status {
            BackendStatus::Succeeded => None,
            BackendStatus::Failed(error) => Some(error),
        }
    }
}

/// Aggregate outcome of a save or clear across the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreResult {
    pub succeeded: usize,
    pub attempted: usize,
    pub outcomes: Vec<BackendOutcome>,
}

impl StoreResult {
    /// At least one backend accepted the call
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }

    pub fn outcome(&self, backend: &str) -> Option<&BackendOutcome> {
        self.outcomes.iter().find(|outcome| outcome.backend == backend)
    }

    pub fn failures(&self) -> impl Iterator<Item = &BackendOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    fn record(&mut self, backend: &dyn SessionBackend, result: Result<(), BackendError>) {
        self.attempted += 1;
        let status = match result {
            Ok(()) => {
                self.succeeded += 1;
                BackendStatus::Succeeded
            }
            Err(error) => BackendStatus::Failed(error),
        };
        self.outcomes.push(BackendOutcome {
            backend: backend.name().to_string(),
            capability: backend.capability(),
            status,
        });
    }
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// The record that was issued and fanned out
    pub record: SessionRecord,
    pub result: StoreResult,
}

/// Everything a `load` pass observed
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub record: Option<SessionRecord>,
    /// Backend the accepted record came from
    pub source: Option<String>,
    /// Backends that faulted during the pass
    pub faults: Vec<BackendOutcome>,
    /// Re-save to the tiers ahead of `source`, when one happened
    pub resync: Option<StoreResult>,
}

#[derive(Debug)]
pub struct SessionStore {
    registry: Registry,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
    backend_timeout_ms: u64,
}

impl SessionStore {
    pub fn new(
        registry: Registry,
        policy: SessionPolicy,
        clock: Arc<dyn Clock>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            policy,
            clock,
            backend_timeout_ms: (backend_timeout.as_millis() as u64).max(1),
        }
    }

    /// Probe the runtime and build a store from configuration
    pub async fn from_config(
        config: &SessionKeepConfig,
        probe: BackendProbe,
        clock: Arc<dyn Clock>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let policy = SessionPolicy::new(config.store.session_timeout())?;
        let registry = Registry::build(config, probe, clock.clone()).await?;
        Ok(Self::new(
            registry,
            policy,
            clock,
            config.store.backend_timeout(),
        ))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Issue a new session and write it to every backend.
    ///
    /// The scope is populated before any backend is called.
    pub async fn save(
        &self,
        scope: &mut SessionScope,
        subject_id: &str,
        display_name: &str,
        role: &str,
    ) -> SessionResult<SaveOutcome> {
        if subject_id.trim().is_empty() {
            return Err(validation_error!("must not be empty", "subject_id", "session_store").into());
        }

        let record = self
            .policy
            .issue(subject_id, display_name, role, self.clock.now())?;
        scope.populate(&record);

        let result = self.fan_out_save(scope, &record, self.registry.backends()).await;
        info!(
            subject = subject_id,
            session_id = %record.session_id,
            succeeded = result.succeeded,
            attempted = result.attempted,
            "Session saved"
        );

        Ok(SaveOutcome { record, result })
    }

    pub async fn load(&self, scope: &mut SessionScope) -> Option<SessionRecord> {
        self.load_with_report(scope).await.record
    }

    /// Find the first valid record in precedence order.
    ///
    /// A backend returning an invalid record does not stop the walk. When
    /// nothing valid is found the scope is tombstoned.
    pub async fn load_with_report(&self, scope: &mut SessionScope) -> LoadReport {
        let now = self.clock.now();
        let backends = self.registry.backends();
        let mut report = LoadReport::default();
        let mut accepted = None;

        for (index, backend) in backends.iter().enumerate() {
            match self.bounded(backend.as_ref(), "load", backend.load(scope)).await {
                Ok(Some(record)) if policy::is_valid(&record, now) => {
                    accepted = Some((index, record));
                    break;
                }
                Ok(Some(record)) => {
                    debug!(
                        backend = backend.name(),
                        session_id = %record.session_id,
                        signed_out = record.signed_out,
                        "Skipping invalid session record"
                    );
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(backend = backend.name(), error = %error, "Backend load failed");
                    report.faults.push(BackendOutcome {
                        backend: backend.name().to_string(),
                        capability: backend.capability(),
                        status: BackendStatus::Failed(error),
                    });
                }
            }
        }

        let Some((index, record)) = accepted else {
            debug!("No valid session found");
            scope.tombstone();
            return report;
        };

        let source = &backends[index];
        scope.populate(&record);

        if source.capability() != Capability::DurableClient && index > 0 {
            let targets: Vec<Arc<dyn SessionBackend>> = backends[..index]
                .iter()
                .filter(|backend| !report.faults.iter().any(|f| f.backend == backend.name()))
                .cloned()
                .collect();

            if !targets.is_empty() {
                let resync = self.fan_out_save(scope, &record, &targets).await;
                info!(
                    source = source.name(),
                    succeeded = resync.succeeded,
                    attempted = resync.attempted,
                    "Re-synchronised recovered session"
                );
                report.resync = Some(resync);
            }
        }

        report.source = Some(source.name().to_string());
        report.record = Some(record);
        report
    }

    /// Remove the session from every backend.
    ///
    /// An empty `subject_id` falls back to the subject held in the scope.
    /// The scope is tombstoned before any backend is called.
    pub async fn clear(&self, scope: &mut SessionScope, subject_id: &str) -> StoreResult {
        let subject = if subject_id.is_empty() {
            scope.subject_id.clone()
        } else {
            subject_id.to_string()
        };
        scope.tombstone();

        let mut result = StoreResult::default();
        for backend in self.registry.iter() {
            let outcome = self
                .bounded(backend.as_ref(), "clear", backend.clear(scope, &subject))
                .await;
            if let Err(error) = &outcome {
                warn!(backend = backend.name(), error = %error, "Backend clear failed");
            }
            result.record(backend.as_ref(), outcome);
        }

        info!(
            subject = %subject,
            succeeded = result.succeeded,
            attempted = result.attempted,
            "Session cleared"
        );
        result
    }

    /// Scope first, full load only when the scope says "signed out".
    pub async fn is_authenticated(&self, scope: &mut SessionScope) -> bool {
        if scope.is_signed_in(self.clock.now()) {
            return true;
        }
        self.load(scope).await.is_some()
    }

    /// Delete expired records from every durable-server backend.
    ///
    /// Returns the total removed, zero when no such backend is registered.
    pub async fn sweep_expired(&self) -> SessionResult<u64> {
        let servers: Vec<_> = self
            .registry
            .iter()
            .filter(|backend| backend.capability() == Capability::DurableServer)
            .collect();
        if servers.is_empty() {
            debug!("No durable-server backend registered, nothing to sweep");
            return Ok(0);
        }

        log_operation_start!("sweep_expired", backends = servers.len());
        let now = self.clock.now();
        let mut deleted = 0u64;
        for backend in servers {
            deleted += performance::measure_async(
                "sweep_expired",
                self.bounded(backend.as_ref(), "sweep", backend.sweep_expired(now)),
            )
            .await?;
        }
        log_operation_success!("sweep_expired", deleted = deleted);
        Ok(deleted)
    }

    async fn fan_out_save(
        &self,
        scope: &mut SessionScope,
        record: &SessionRecord,
        targets: &[Arc<dyn SessionBackend>],
    ) -> StoreResult {
        let mut result = StoreResult::default();
        for backend in targets {
            let outcome = self
                .bounded(backend.as_ref(), "save", backend.save(scope, record))
                .await;
            if let Err(error) = &outcome {
                warn!(backend = backend.name(), error = %error, "Backend save failed");
            }
            result.record(backend.as_ref(), outcome);
        }
        result
    }

    /// Run one backend call under the store-wide timeout.
    async fn bounded<T, F>(
        &self,
        backend: &dyn SessionBackend,
        operation: &str,
        call: F,
    ) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let operation = format!("{}.{}", backend.name(), operation);
        match with_timeout(call, self.backend_timeout_ms, &operation).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                operation,
                timeout_ms: self.backend_timeout_ms,
            }),
        }
    }
}
