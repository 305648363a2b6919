//! Local storage: the JSON record plus a last-write timestamp slot

use super::{BackendDescriptor, Capability, SessionBackend};
use crate::client::LocalStorageArea;
use crate::clock::Clock;
use crate::codec;
use crate::error::BackendError;
use crate::record::SessionRecord;
use crate::scope::SessionScope;
use async_trait::async_trait;
use std::sync::Arc;

pub struct LocalStorageBackend {
    storage: Arc<dyn LocalStorageArea>,
    clock: Arc<dyn Clock>,
    session_key: String,
    timestamp_key: String,
    descriptor: BackendDescriptor,
}

impl LocalStorageBackend {
    pub const NAME: &'static str = "local_storage";

    pub fn new(storage: Arc<dyn LocalStorageArea>, app_prefix: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            session_key: format!("{}_session", app_prefix),
            timestamp_key: format!("{}_timestamp", app_prefix),
            descriptor: BackendDescriptor::new(Self::NAME, Capability::DurableClient),
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn timestamp_key(&self) -> &str {
        &self.timestamp_key
    }
}

#[async_trait]
impl SessionBackend for LocalStorageBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn save(
        &self,
        _scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError> {
        let json = codec::encode_json(record)?;
        self.storage.set_item(&self.session_key, &json).await?;
        self.storage
            .set_item(
                &self.timestamp_key,
                &self.clock.now().timestamp_millis().to_string(),
            )
            .await
    }

    async fn load(&self, _scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError> {
        match self.storage.get_item(&self.session_key).await? {
            Some(json) if !json.is_empty() => Ok(codec::decode_json(&json)),
            _ => Ok(None),
        }
    }

    async fn clear(
        &self,
        _scope: &mut SessionScope,
        _subject_hint: &str,
    ) -> Result<(), BackendError> {
        self.storage.remove_item(&self.session_key).await?;
        self.storage.remove_item(&self.timestamp_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryLocalStorage;
    use crate::clock::ManualClock;
    use crate::policy::SessionPolicy;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_writes_both_slots() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let storage = MemoryLocalStorage::new();
        let backend = LocalStorageBackend::new(
            Arc::new(storage.clone()),
            "iconnet_app",
            Arc::new(ManualClock::new(now)),
        );
        let record = SessionPolicy::default().issue("bob", "Bob B", "Kurir", now).unwrap();
        let mut scope = SessionScope::new();

        backend.save(&mut scope, &record).await.unwrap();

        assert_eq!(
            storage.item("iconnet_app_timestamp").await,
            Some(now.timestamp_millis().to_string())
        );
        assert_eq!(backend.load(&scope).await.unwrap(), Some(record));

        backend.clear(&mut scope, "bob").await.unwrap();
        assert!(storage.item("iconnet_app_session").await.is_none());
        assert!(storage.item("iconnet_app_timestamp").await.is_none());
    }
}
