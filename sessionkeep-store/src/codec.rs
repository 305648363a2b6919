//! Session record codec
//!
//! Converts a [`SessionRecord`] into the scalar form each medium accepts and
//! back. Decoding never fails loudly: a missing field, a malformed timestamp
//! or a non-boolean `signed_out` decodes to `None` and is logged.

use crate::error::BackendError;
use crate::record::{format_timestamp, parse_timestamp, SessionRecord};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

/// Field slots used by per-field media, in canonical order
pub const FIELD_NAMES: [&str; 7] = [
    "subject_id",
    "display_name",
    "role",
    "issued_at",
    "expires_at",
    "session_id",
    "signed_out",
];

pub fn encode_json(record: &SessionRecord) -> Result<String, BackendError> {
    serde_json::to_string(record).map_err(|e| BackendError::Codec(e.to_string()))
}

pub fn decode_json(raw: &str) -> Option<SessionRecord> {
    match serde_json::from_str::<SessionRecord>(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Discarding malformed session payload");
            None
        }
    }
}

/// base64(JSON), the form carried by the session cookie
pub fn encode_base64(record: &SessionRecord) -> Result<String, BackendError> {
    encode_json(record).map(|json| BASE64.encode(json))
}

pub fn decode_base64(raw: &str) -> Option<SessionRecord> {
    let bytes = match BASE64.decode(raw.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Session cookie is not valid base64");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(json) => decode_json(&json),
        Err(e) => {
            warn!(error = %e, "Session cookie is not valid UTF-8");
            None
        }
    }
}

/// One string per field, in [`FIELD_NAMES`] order
pub fn to_fields(record: &SessionRecord) -> Vec<(&'static str, String)> {
    vec![
        ("subject_id", record.subject_id.clone()),
        ("display_name", record.display_name.clone()),
        ("role", record.role.clone()),
        ("issued_at", format_timestamp(&record.issued_at)),
        ("expires_at", format_timestamp(&record.expires_at)),
        ("session_id", record.session_id.clone()),
        ("signed_out", record.signed_out.to_string()),
    ]
}

pub fn from_fields(fields: &HashMap<String, String>) -> Option<SessionRecord> {
    let field = |name: &str| fields.get(name).cloned();

    let signed_out = match field("signed_out")?.as_str() {
        "true" => true,
        "false" => false,
        other => {
            warn!(value = other, "signed_out field is not a boolean");
            return None;
        }
    };

    Some(SessionRecord {
        subject_id: field("subject_id")?,
        display_name: field("display_name")?,
        role: field("role")?,
        issued_at: parse_field_timestamp(&field("issued_at")?)?,
        expires_at: parse_field_timestamp(&field("expires_at")?)?,
        session_id: field("session_id")?,
        signed_out,
    })
}

fn parse_field_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        warn!(value = raw, "Discarding session field with malformed timestamp");
    }
    parsed
}

/// Queryable columns of a record, stored next to the full encoded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordProjection {
    pub session_id: String,
    pub subject_id: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
    pub expires_at: String,
}

impl RecordProjection {
    pub fn of(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            subject_id: record.subject_id.clone(),
            display_name: record.display_name.clone(),
            role: record.role.clone(),
            created_at: format_timestamp(&record.issued_at),
            expires_at: format_timestamp(&record.expires_at),
        }
    }

    /// Rebuild the record from the columns alone.
    ///
    /// Projected rows only exist for signed-in sessions, so `signed_out` is `false`.
    pub fn to_record(&self) -> Option<SessionRecord> {
        Some(SessionRecord {
            subject_id: self.subject_id.clone(),
            display_name: self.display_name.clone(),
            role: self.role.clone(),
            issued_at: parse_field_timestamp(&self.created_at)?,
            expires_at: parse_field_timestamp(&self.expires_at)?,
            session_id: self.session_id.clone(),
            signed_out: false,
        })
    }
}
