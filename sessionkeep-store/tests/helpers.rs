//! Shared fixtures for store integration tests
//!
//! Set `TEST_LOG=1` to see store logs while a test runs.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sessionkeep_core::SessionKeepConfig;
use sessionkeep_store::{
    BackendDescriptor, BackendError, BackendProbe, Capability, ManualClock, MemoryCookieJar,
    MemoryLocalStorage, SessionBackend, SessionRecord, SessionScope, SessionStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

pub fn init_tracing() {
    LazyLock::force(&TRACING);
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap()
}

/// Every medium enabled, database in memory, no database retries
pub fn test_config() -> SessionKeepConfig {
    let mut config = SessionKeepConfig::default();
    config.cookies.secret = Some("integration-secret".to_string());
    config.database.url = Some("sqlite::memory:".to_string());
    config.database.retry_attempts = 1;
    config.store.backend_timeout_ms = 2000;
    config
}

pub struct Harness {
    pub store: SessionStore,
    pub clock: ManualClock,
    pub jar: MemoryCookieJar,
    pub storage: MemoryLocalStorage,
}

impl Harness {
    /// cookie, signed_cookie, local_storage, database, volatile
    pub async fn full() -> Self {
        Self::build(test_config(), true).await
    }

    /// database and volatile only: no client media in this runtime
    pub async fn server_only() -> Self {
        Self::build(test_config(), false).await
    }

    pub async fn build(config: SessionKeepConfig, client_media: bool) -> Self {
        init_tracing();

        let clock = ManualClock::new(t0());
        let jar = MemoryCookieJar::new();
        let storage = MemoryLocalStorage::new();

        let mut probe = BackendProbe::new();
        if client_media {
            probe = probe
                .with_cookie_jar(Arc::new(jar.clone()))
                .with_local_storage(Arc::new(storage.clone()));
        }

        let store = SessionStore::from_config(&config, probe, Arc::new(clock.clone()))
            .await
            .expect("store should build");

        Self {
            store,
            clock,
            jar,
            storage,
        }
    }

    /// A scope as a fresh interactive run would see it, knowing only the subject
    pub fn seeded_scope(subject: &str) -> SessionScope {
        let mut scope = SessionScope::new();
        scope.seed_subject(subject);
        scope
    }
}

/// Backend whose behavior is set up by the test
pub struct ScriptedBackend {
    descriptor: BackendDescriptor,
    stored: Mutex<Option<SessionRecord>>,
    failing: bool,
    delay: Option<Duration>,
    saves: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(name: &str, capability: Capability) -> Self {
        Self {
            descriptor: BackendDescriptor::new(name, capability),
            stored: Mutex::new(None),
            failing: false,
            delay: None,
            saves: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn holding(self, record: SessionRecord) -> Self {
        *self.stored.lock().unwrap() = Some(record);
        self
    }

    pub fn stored(&self) -> Option<SessionRecord> {
        self.stored.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), BackendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(BackendError::io(format!("{} is down", self.descriptor.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn save(
        &self,
        _scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError> {
        self.enter().await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.stored.lock().unwrap() = Some(record.clone());
        Ok(())
    }

    async fn load(&self, _scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError> {
        self.enter().await?;
        Ok(self.stored())
    }

    async fn clear(
        &self,
        _scope: &mut SessionScope,
        _subject_hint: &str,
    ) -> Result<(), BackendError> {
        self.enter().await?;
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

/// Coerce a scripted backend for `Registry::with_backends`
pub fn dyn_backend(backend: &Arc<ScriptedBackend>) -> Arc<dyn SessionBackend> {
    backend.clone()
}
