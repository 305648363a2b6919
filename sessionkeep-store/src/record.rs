//! The session record and its timestamp representation

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One persisted login session.
///
/// Records are issued by [`SessionPolicy::issue`](crate::SessionPolicy::issue);
/// `expires_at` is always `issued_at + session_timeout` and is never supplied
/// by the caller. Re-saving replaces the record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Stable user identifier, never empty for a signed-in record
    pub subject_id: String,
    pub display_name: String,
    /// Application-defined role, e.g. `Admin`
    pub role: String,
    #[serde(with = "timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
    /// 32 hex characters, a correlation key rather than a credential
    pub session_id: String,
    /// `true` means "not authenticated" whatever the other fields hold
    pub signed_out: bool,
}

impl SessionRecord {
    /// Validity at `now`: signed in, has a subject, and `now` is before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.subject_id.is_empty() && !self.signed_out && now < self.expires_at
    }
}

/// Fixed-width RFC 3339 in UTC with microseconds.
///
/// Every medium stores timestamps in this form, so text comparison in SQL
/// matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) mod timestamp {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("malformed timestamp: {}", raw)))
    }
}
