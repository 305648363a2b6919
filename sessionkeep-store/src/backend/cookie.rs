//! Session cookie: one slot holding base64(JSON(record)) that expires with the session

use super::{BackendDescriptor, Capability, SessionBackend};
use crate::client::CookieJar;
use crate::codec;
use crate::error::BackendError;
use crate::record::SessionRecord;
use crate::scope::SessionScope;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct CookieBackend {
    jar: Arc<dyn CookieJar>,
    cookie_name: String,
    descriptor: BackendDescriptor,
}

impl CookieBackend {
    pub const NAME: &'static str = "cookie";

    pub fn new(jar: Arc<dyn CookieJar>, app_prefix: &str) -> Self {
        Self {
            jar,
            cookie_name: format!("{}_session", app_prefix),
            descriptor: BackendDescriptor::new(Self::NAME, Capability::DurableClient),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

#[async_trait]
impl SessionBackend for CookieBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn save(
        &self,
        _scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError> {
        let encoded = codec::encode_base64(record)?;
        self.jar
            .set(&self.cookie_name, &encoded, record.expires_at)
            .await?;
        debug!(cookie = %self.cookie_name, "Session written to cookie");
        Ok(())
    }

    async fn load(&self, _scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError> {
        match self.jar.get(&self.cookie_name).await? {
            Some(encoded) if !encoded.is_empty() => Ok(codec::decode_base64(&encoded)),
            _ => Ok(None),
        }
    }

    async fn clear(
        &self,
        _scope: &mut SessionScope,
        _subject_hint: &str,
    ) -> Result<(), BackendError> {
        self.jar.delete(&self.cookie_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryCookieJar;
    use crate::policy::SessionPolicy;
    use chrono::Utc;

    #[tokio::test]
    async fn test_cookie_carries_expiry_attribute() {
        let jar = MemoryCookieJar::new();
        let backend = CookieBackend::new(Arc::new(jar.clone()), "iconnet_app");
        let record = SessionPolicy::default()
            .issue("alice", "Alice A", "Admin", Utc::now())
            .unwrap();
        let mut scope = SessionScope::new();

        backend.save(&mut scope, &record).await.unwrap();

        let stored = jar.cookie("iconnet_app_session").await.unwrap();
        assert_eq!(stored.expires_at, record.expires_at);
        assert_eq!(backend.load(&scope).await.unwrap(), Some(record));

        backend.clear(&mut scope, "alice").await.unwrap();
        assert!(backend.load(&scope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_cookie_is_absent() {
        let jar = MemoryCookieJar::new();
        jar.set("iconnet_app_session", "not-a-session", Utc::now())
            .await
            .unwrap();
        let backend = CookieBackend::new(Arc::new(jar), "iconnet_app");

        assert!(backend.load(&SessionScope::new()).await.unwrap().is_none());
    }
}
