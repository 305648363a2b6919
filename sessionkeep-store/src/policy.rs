//! Session lifecycle policy: id generation, expiration horizon, validity

use crate::record::SessionRecord;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sha2::{Digest, Sha256};
use sessionkeep_core::{
    validation_error, SessionKeepResult, DEFAULT_SESSION_TIMEOUT_SECS, MAX_SESSION_TIMEOUT_SECS,
};

/// Length of a generated session id in hex characters
pub const SESSION_ID_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    session_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            session_timeout: Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS as i64),
        }
    }
}

impl SessionPolicy {
    /// Fixed timeout applied to every new record. There is no sliding renewal on read.
    ///
    /// The timeout must be non-zero and at most [`MAX_SESSION_TIMEOUT_SECS`].
    pub fn new(session_timeout: std::time::Duration) -> SessionKeepResult<Self> {
        if session_timeout.is_zero() || session_timeout.as_secs() > MAX_SESSION_TIMEOUT_SECS {
            return Err(validation_error!(
                format!("{}s is outside 1s..={}s", session_timeout.as_secs(), MAX_SESSION_TIMEOUT_SECS),
                "session_timeout",
                "session_policy"
            ));
        }
        let session_timeout = Duration::from_std(session_timeout).map_err(|e| {
            validation_error!(e.to_string(), "session_timeout", "session_policy")
        })?;
        Ok(Self { session_timeout })
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Build a fresh signed-in record with a new session id.
    ///
    /// Timestamps are truncated to microseconds so every storage
    /// representation reproduces them exactly.
    pub fn issue(
        &self,
        subject_id: &str,
        display_name: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> SessionKeepResult<SessionRecord> {
        let issued_at = now.trunc_subsecs(6);
        let expires_at = issued_at
            .checked_add_signed(self.session_timeout)
            .ok_or_else(|| {
                validation_error!("expiry is past the representable range", "issued_at", "session_policy")
            })?;

        Ok(SessionRecord {
            subject_id: subject_id.to_string(),
            display_name: display_name.to_string(),
            role: role.to_string(),
            issued_at,
            expires_at,
            session_id: generate_session_id(subject_id, now),
            signed_out: false,
        })
    }
}

/// Whether a loaded record still represents an active session at `now`.
pub fn is_valid(record: &SessionRecord, now: DateTime<Utc>) -> bool {
    record.is_valid_at(now)
}

/// `sha256(subject _ timestamp _ uuid4)`, hex, truncated to [`SESSION_ID_LEN`].
pub fn generate_session_id(subject_id: &str, now: DateTime<Utc>) -> String {
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros());
    let unique = format!("{}_{}_{}", subject_id, nanos, uuid::Uuid::new_v4());

    let mut hasher = Sha256::new();
    hasher.update(unique.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..SESSION_ID_LEN].to_string()
}
