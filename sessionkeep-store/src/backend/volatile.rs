//! The in-process scope as a backend of last resort

use super::{BackendDescriptor, Capability, SessionBackend};
use crate::error::BackendError;
use crate::record::SessionRecord;
use crate::scope::SessionScope;
use async_trait::async_trait;

pub struct VolatileBackend {
    descriptor: BackendDescriptor,
}

impl Default for VolatileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatileBackend {
    pub const NAME: &'static str = "volatile";

    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor::new(Self::NAME, Capability::Volatile),
        }
    }
}

#[async_trait]
impl SessionBackend for VolatileBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn save(
        &self,
        scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError> {
        scope.populate(record);
        Ok(())
    }

    async fn load(&self, scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError> {
        Ok(scope.to_record())
    }

    async fn clear(
        &self,
        scope: &mut SessionScope,
        _subject_hint: &str,
    ) -> Result<(), BackendError> {
        scope.tombstone();
        Ok(())
    }
}
