//! Volatile in-process scope
//!
//! The caller owns one `SessionScope` per interactive run and passes it to
//! every store call. It starts empty and signed out, and is blanked again by
//! `tombstone` on logout or when no valid session can be found.

use crate::record::SessionRecord;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
    pub subject_id: String,
    /// Mirrors the record's `display_name` (the email slot of the dashboard)
    pub display_name: String,
    pub role: String,
    pub signed_out: bool,
    pub session_id: String,
    // (issued_at, expires_at) of the mirrored record; a scope read never extends a session
    stamps: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Default for SessionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionScope {
    pub fn new() -> Self {
        Self {
            subject_id: String::new(),
            display_name: String::new(),
            role: String::new(),
            signed_out: true,
            session_id: String::new(),
            stamps: None,
        }
    }

    /// Mirror a record into the scope.
    pub fn populate(&mut self, record: &SessionRecord) {
        self.subject_id = record.subject_id.clone();
        self.display_name = record.display_name.clone();
        self.role = record.role.clone();
        self.signed_out = record.signed_out;
        self.session_id = record.session_id.clone();
        self.stamps = Some((record.issued_at, record.expires_at));
    }

    /// Blank every field and force `signed_out`.
    pub fn tombstone(&mut self) {
        *self = Self::new();
    }

    /// Remember who the host believes the user is, without signing them in.
    ///
    /// Subject-keyed media use this as their lookup key on the next load.
    pub fn seed_subject(&mut self, subject_id: &str) {
        self.tombstone();
        self.subject_id = subject_id.to_string();
    }

    pub fn subject_hint(&self) -> Option<&str> {
        if self.subject_id.is_empty() {
            None
        } else {
            Some(&self.subject_id)
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.stamps.map(|(_, expires_at)| expires_at)
    }

    /// Signed in and not past the mirrored expiry. No I/O.
    pub fn is_signed_in(&self, now: DateTime<Utc>) -> bool {
        self.to_record().is_some_and(|record| record.is_valid_at(now))
    }

    /// The mirrored record, if the scope holds a signed-in session.
    pub fn to_record(&self) -> Option<SessionRecord> {
        if self.subject_id.is_empty() || self.signed_out {
            return None;
        }
        let (issued_at, expires_at) = self.stamps?;
        Some(SessionRecord {
            subject_id: self.subject_id.clone(),
            display_name: self.display_name.clone(),
            role: self.role.clone(),
            issued_at,
            expires_at,
            session_id: self.session_id.clone(),
            signed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SessionPolicy;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_initial_state() {
        let scope = SessionScope::new();
        assert!(scope.signed_out);
        assert!(scope.subject_hint().is_none());
        assert!(scope.to_record().is_none());
    }

    #[test]
    fn test_populate_and_tombstone() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = SessionPolicy::default().issue("alice", "Alice A", "Admin", now).unwrap();

        let mut scope = SessionScope::new();
        scope.populate(&record);
        assert_eq!(scope.to_record(), Some(record.clone()));
        assert!(scope.is_signed_in(now + Duration::hours(1)));
        assert!(!scope.is_signed_in(now + Duration::days(8)));

        scope.tombstone();
        assert_eq!(scope, SessionScope::new());
    }

    #[test]
    fn test_seed_subject_stays_signed_out() {
        let mut scope = SessionScope::new();
        scope.seed_subject("alice");

        assert_eq!(scope.subject_hint(), Some("alice"));
        assert!(scope.signed_out);
        assert!(scope.to_record().is_none());
    }
}
