//! Signed per-field cookies
//!
//! Every record field lives in its own cookie under `{app_prefix}_legacy_`,
//! next to a signature cookie holding a keyed SHA-256 digest of the canonical
//! field encoding. A missing slot or a digest mismatch reads as "no session".

use super::{BackendDescriptor, Capability, SessionBackend};
use crate::client::CookieJar;
use crate::codec::{self, FIELD_NAMES};
use crate::error::BackendError;
use crate::record::SessionRecord;
use crate::scope::SessionScope;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const SIGNATURE_SLOT: &str = "sig";

pub struct SignedCookieBackend {
    jar: Arc<dyn CookieJar>,
    prefix: String,
    secret: String,
    descriptor: BackendDescriptor,
}

impl SignedCookieBackend {
    pub const NAME: &'static str = "signed_cookie";

    pub fn new(jar: Arc<dyn CookieJar>, app_prefix: &str, secret: &str) -> Self {
        Self {
            jar,
            prefix: format!("{}_legacy_", app_prefix),
            secret: secret.to_string(),
            descriptor: BackendDescriptor::new(Self::NAME, Capability::DurableClient),
        }
    }

    fn slot(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field)
    }

    fn ensure_ready(&self) -> Result<(), BackendError> {
        if self.jar.ready() {
            Ok(())
        } else {
            Err(BackendError::unavailable("cookie bridge not ready"))
        }
    }

    /// Keyed digest over length-prefixed `(name, value)` pairs in canonical
    /// field order, so no value can shift a field boundary.
    fn sign<'a, I>(&self, fields: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update([0u8]);
        for part in fields.into_iter().flat_map(|(name, value)| [name, value]) {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(self.secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl SessionBackend for SignedCookieBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn save(
        &self,
        _scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError> {
        self.ensure_ready()?;

        let fields = codec::to_fields(record);
        let signature = self.sign(fields.iter().map(|(name, value)| (*name, value.as_str())));

        for (name, value) in &fields {
            self.jar
                .set(&self.slot(name), value, record.expires_at)
                .await?;
        }
        self.jar
            .set(&self.slot(SIGNATURE_SLOT), &signature, record.expires_at)
            .await?;

        debug!(prefix = %self.prefix, "Session written to signed cookies");
        Ok(())
    }

    async fn load(&self, _scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError> {
        self.ensure_ready()?;

        let mut fields = HashMap::with_capacity(FIELD_NAMES.len());
        for name in FIELD_NAMES {
            match self.jar.get(&self.slot(name)).await? {
                Some(value) => {
                    fields.insert(name.to_string(), value);
                }
                None => return Ok(None),
            }
        }

        let Some(signature) = self.jar.get(&self.slot(SIGNATURE_SLOT)).await? else {
            warn!(prefix = %self.prefix, "Signed session cookies carry no signature");
            return Ok(None);
        };

        let expected = self.sign(
            FIELD_NAMES
                .iter()
                .filter_map(|name| fields.get(*name).map(|value| (*name, value.as_str()))),
        );
        if expected != signature {
            warn!(prefix = %self.prefix, "Signed session cookies failed verification");
            return Ok(None);
        }

        Ok(codec::from_fields(&fields))
    }

    async fn clear(
        &self,
        _scope: &mut SessionScope,
        _subject_hint: &str,
    ) -> Result<(), BackendError> {
        self.ensure_ready()?;

        for name in FIELD_NAMES.iter().chain(std::iter::once(&SIGNATURE_SLOT)) {
            self.jar.delete(&self.slot(name)).await?;
        }
        Ok(())
    }
}
