//! Backend registry
//!
//! Probes each candidate medium once, at construction, and keeps the usable
//! ones in fixed precedence: cookie, signed cookie, local storage, database,
//! volatile. The volatile backend is always appended, so a registry is never
//! empty.

use crate::backend::{
    BackendDescriptor, Capability, CookieBackend, LocalStorageBackend, SessionBackend,
    SignedCookieBackend, VolatileBackend,
};
#[cfg(feature = "sqlite")]
use crate::backend::DatabaseBackend;
use crate::client::{CookieJar, LocalStorageArea};
use crate::clock::Clock;
use crate::error::SessionResult;
#[cfg(feature = "sqlite")]
use sessionkeep_core::storage_error;
use sessionkeep_core::SessionKeepConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the hosting runtime can offer, stated explicitly
#[derive(Clone, Default)]
pub struct BackendProbe {
    cookie_jar: Option<Arc<dyn CookieJar>>,
    local_storage: Option<Arc<dyn LocalStorageArea>>,
    #[cfg(feature = "sqlite")]
    pool: Option<sqlx::SqlitePool>,
}

impl BackendProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    pub fn with_local_storage(mut self, storage: Arc<dyn LocalStorageArea>) -> Self {
        self.local_storage = Some(storage);
        self
    }

    /// Use an existing pool instead of connecting to `database.url`
    #[cfg(feature = "sqlite")]
    pub fn with_pool(mut self, pool: sqlx::SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }
}

pub struct Registry {
    backends: Vec<Arc<dyn SessionBackend>>,
    probed: Vec<BackendDescriptor>,
    #[cfg(feature = "sqlite")]
    database: Option<Arc<DatabaseBackend>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.descriptors())
            .finish()
    }
}

impl Registry {
    /// Probe every candidate medium and keep the available ones.
    ///
    /// An absent or unreachable medium is omitted. The only error is a
    /// reachable database whose session table cannot be created.
    pub async fn build(
        config: &SessionKeepConfig,
        probe: BackendProbe,
        clock: Arc<dyn Clock>,
    ) -> SessionResult<Self> {
        let prefix = config.store.app_prefix.as_str();
        let mut backends: Vec<Arc<dyn SessionBackend>> = Vec::new();
        let mut probed = Vec::new();

        let jar = probe.cookie_jar.clone();

        let cookie_ok = config.cookies.enabled && jar.is_some();
        probed.push(probe_entry(CookieBackend::NAME, Capability::DurableClient, cookie_ok));
        if let (true, Some(jar)) = (cookie_ok, jar.clone()) {
            backends.push(Arc::new(CookieBackend::new(jar, prefix)));
        }

        let secret = config
            .cookies
            .secret
            .as_deref()
            .filter(|secret| !secret.is_empty());
        let signed_ok = config.cookies.signed_enabled
            && secret.is_some()
            && jar.as_ref().is_some_and(|jar| jar.ready());
        probed.push(probe_entry(
            SignedCookieBackend::NAME,
            Capability::DurableClient,
            signed_ok,
        ));
        if let (true, Some(jar), Some(secret)) = (signed_ok, jar, secret) {
            backends.push(Arc::new(SignedCookieBackend::new(jar, prefix, secret)));
        }

        let storage_ok = config.local_storage.enabled && probe.local_storage.is_some();
        probed.push(probe_entry(
            LocalStorageBackend::NAME,
            Capability::DurableClient,
            storage_ok,
        ));
        if let (true, Some(storage)) = (storage_ok, probe.local_storage.clone()) {
            backends.push(Arc::new(LocalStorageBackend::new(
                storage,
                prefix,
                clock.clone(),
            )));
        }

        #[cfg(feature = "sqlite")]
        let database = {
            let database = probe_database(config, probe.pool.clone(), clock.clone()).await?;
            probed.push(probe_entry(
                DatabaseBackend::NAME,
                Capability::DurableServer,
                database.is_some(),
            ));
            if let Some(database) = &database {
                backends.push(database.clone());
            }
            database
        };

        backends.push(Arc::new(VolatileBackend::new()));
        probed.push(probe_entry(VolatileBackend::NAME, Capability::Volatile, true));

        let registry = Self {
            backends,
            probed,
            #[cfg(feature = "sqlite")]
            database,
        };

        info!(
            backends = ?registry.names(),
            "Session backend registry ready"
        );
        Ok(registry)
    }

    /// Registry over caller-supplied backends.
    ///
    /// Backends are ordered by capability, keeping the given order within a
    /// tier. A volatile backend is appended if none was supplied.
    pub fn with_backends(mut backends: Vec<Arc<dyn SessionBackend>>) -> Self {
        backends.sort_by_key(|backend| backend.capability());
        if !backends
            .iter()
            .any(|backend| backend.capability() == Capability::Volatile)
        {
            backends.push(Arc::new(VolatileBackend::new()));
        }

        let probed = backends
            .iter()
            .map(|backend| backend.descriptor().clone())
            .collect();

        Self {
            backends,
            probed,
            #[cfg(feature = "sqlite")]
            database: None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SessionBackend>> {
        self.backends.iter()
    }

    pub fn backends(&self) -> &[Arc<dyn SessionBackend>] {
        &self.backends
    }

    /// Active backends in precedence order
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.backends
            .iter()
            .map(|backend| backend.descriptor().clone())
            .collect()
    }

    /// Every candidate considered at construction, including omitted ones
    pub fn probed(&self) -> &[BackendDescriptor] {
        &self.probed
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    #[cfg(feature = "sqlite")]
    pub fn database(&self) -> Option<&Arc<DatabaseBackend>> {
        self.database.as_ref()
    }
}

fn probe_entry(name: &str, capability: Capability, available: bool) -> BackendDescriptor {
    if !available {
        debug!(backend = name, "Backend unavailable, omitted from registry");
    }
    BackendDescriptor {
        available,
        ..BackendDescriptor::new(name, capability)
    }
}

#[cfg(feature = "sqlite")]
async fn probe_database(
    config: &SessionKeepConfig,
    pool: Option<sqlx::SqlitePool>,
    clock: Arc<dyn Clock>,
) -> SessionResult<Option<Arc<DatabaseBackend>>> {
    let pool = match pool {
        Some(pool) => pool,
        None if config.database.url.is_some() => {
            match DatabaseBackend::connect(&config.database).await {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(backend = DatabaseBackend::NAME, error = %e, "Could not connect to session database");
                    return Ok(None);
                }
            }
        }
        None => return Ok(None),
    };

    if let Err(e) = DatabaseBackend::health_check(&pool).await {
        warn!(backend = DatabaseBackend::NAME, error = %e, "Session database did not answer");
        return Ok(None);
    }

    let backend = DatabaseBackend::new(pool, &config.database, clock)
        .await
        .map_err(|e| storage_error!("Could not prepare the session table", "registry", e))?;
    Ok(Some(Arc::new(backend)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryCookieJar, MemoryLocalStorage};
    use crate::clock::SystemClock;

    fn config_with_secret() -> SessionKeepConfig {
        let mut config = SessionKeepConfig::default();
        config.cookies.secret = Some("s3cret".to_string());
        config
    }

    #[tokio::test]
    async fn test_bare_runtime_has_only_volatile() {
        let registry = Registry::build(
            &SessionKeepConfig::default(),
            BackendProbe::new(),
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        assert_eq!(registry.names(), vec!["volatile"]);
        assert!(registry.probed().iter().filter(|d| !d.available).count() >= 3);
    }

    #[tokio::test]
    async fn test_fixed_precedence() {
        let probe = BackendProbe::new()
            .with_cookie_jar(Arc::new(MemoryCookieJar::new()))
            .with_local_storage(Arc::new(MemoryLocalStorage::new()));
        let registry = Registry::build(&config_with_secret(), probe, Arc::new(SystemClock))
            .await
            .unwrap();

        assert_eq!(
            registry.names(),
            vec!["cookie", "signed_cookie", "local_storage", "volatile"]
        );
    }

    #[tokio::test]
    async fn test_signed_cookie_needs_secret_and_ready_bridge() {
        let jar = MemoryCookieJar::new();
        let probe = BackendProbe::new().with_cookie_jar(Arc::new(jar.clone()));
        let registry = Registry::build(&SessionKeepConfig::default(), probe, Arc::new(SystemClock))
            .await
            .unwrap();
        assert_eq!(registry.names(), vec!["cookie", "volatile"]);

        jar.set_ready(false);
        let probe = BackendProbe::new().with_cookie_jar(Arc::new(jar));
        let registry = Registry::build(&config_with_secret(), probe, Arc::new(SystemClock))
            .await
            .unwrap();
        assert_eq!(registry.names(), vec!["cookie", "volatile"]);
    }

    #[tokio::test]
    async fn test_with_backends_orders_and_appends_volatile() {
        let cookie: Arc<dyn SessionBackend> = Arc::new(CookieBackend::new(
            Arc::new(MemoryCookieJar::new()),
            "app",
        ));
        let registry = Registry::with_backends(vec![cookie]);

        assert_eq!(registry.names(), vec!["cookie", "volatile"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.descriptors().iter().all(|d| d.available));
    }
}
