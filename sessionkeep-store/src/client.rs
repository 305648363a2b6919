//! Client-medium bridges
//!
//! The hosting runtime exposes the browser's cookie jar and local storage
//! through these traits. In-memory implementations back runtimes that proxy
//! client state themselves, and tests.

use crate::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Named cookie slots with an expiry attribute
#[async_trait]
pub trait CookieJar: Send + Sync {
    /// Whether the jar has finished its handshake with the client
    fn ready(&self) -> bool {
        true
    }

    async fn get(&self, name: &str) -> Result<Option<String>, BackendError>;

    async fn set(&self, name: &str, value: &str, expires_at: DateTime<Utc>)
        -> Result<(), BackendError>;

    async fn delete(&self, name: &str) -> Result<(), BackendError>;
}

/// Key/value slots that survive reloads on the client
#[async_trait]
pub trait LocalStorageArea: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, BackendError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError>;

    async fn remove_item(&self, key: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Cookie jar held in process memory. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct MemoryCookieJar {
    cookies: Arc<RwLock<HashMap<String, StoredCookie>>>,
    ready: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl Default for MemoryCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self {
            cookies: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(AtomicBool::new(true)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Make every subsequent call fail with an I/O error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn cookie(&self, name: &str) -> Option<StoredCookie> {
        self.cookies.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cookies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cookies.read().await.is_empty()
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::io("cookie jar unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CookieJar for MemoryCookieJar {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn get(&self, name: &str) -> Result<Option<String>, BackendError> {
        self.check()?;
        Ok(self.cookies.read().await.get(name).map(|c| c.value.clone()))
    }

    async fn set(
        &self,
        name: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        self.check()?;
        self.cookies.write().await.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), BackendError> {
        self.check()?;
        self.cookies.write().await.remove(name);
        Ok(())
    }
}

/// Local storage held in process memory. Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with an I/O error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn item(&self, key: &str) -> Option<String> {
        self.items.read().await.get(key).cloned()
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::io("local storage unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStorageArea for MemoryLocalStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.check()?;
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.check()?;
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        self.check()?;
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cookie_jar_slots() {
        let jar = MemoryCookieJar::new();
        let expires = Utc::now();

        jar.set("app_session", "payload", expires).await.unwrap();
        assert_eq!(jar.get("app_session").await.unwrap().as_deref(), Some("payload"));
        assert_eq!(jar.cookie("app_session").await.unwrap().expires_at, expires);

        jar.delete("app_session").await.unwrap();
        assert!(jar.get("app_session").await.unwrap().is_none());
        assert!(jar.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let jar = MemoryCookieJar::new();
        jar.set_failing(true);
        assert!(jar.get("x").await.is_err());

        let storage = MemoryLocalStorage::new();
        storage.set_failing(true);
        assert!(storage.set_item("x", "y").await.is_err());
        storage.set_failing(false);
        storage.set_item("x", "y").await.unwrap();
        assert_eq!(storage.item("x").await.as_deref(), Some("y"));
    }
}
