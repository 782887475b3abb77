use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-owned presence snapshot for one user, as returned by
/// `GET /status/{user_id}`.
///
/// Every field is tolerant of being absent: the backend returns
/// `online_status = false, last_seen = null` for a user who has never
/// heartbeated, and older deployments omit `computed_at` and
/// `is_realtime` entirely. A missing field degrades to its zero value
/// rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresenceRecord {
    #[serde(default)]
    pub online_status: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Server instant at which this snapshot was computed. Used client-side
    /// to cancel out server/client clock skew in "time since" math.
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
    /// Whether `online_status` came from a live push channel rather than a
    /// stale poll. Advisory, display only.
    #[serde(default)]
    pub is_realtime: bool,
}

impl PresenceRecord {
    /// The record the server reports for a user it has never seen.
    pub fn never_seen() -> Self {
        Self {
            online_status: false,
            last_seen: None,
            computed_at: None,
            is_realtime: false,
        }
    }
}

/// Body of `POST /status/{user_id}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct StatusUpdate {
    pub online: bool,
}

/// The status endpoint sometimes wraps the record in a one-element array.
/// Accept both shapes and take the first element of an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StatusBody {
    One(PresenceRecord),
    Many(Vec<PresenceRecord>),
}

impl StatusBody {
    pub(crate) fn into_record(self) -> Option<PresenceRecord> {
        match self {
            StatusBody::One(record) => Some(record),
            StatusBody::Many(records) => records.into_iter().next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_record() {
        let record: PresenceRecord = serde_json::from_str(
            r#"{
                "online_status": true,
                "last_seen": "2026-08-08T10:15:00Z",
                "computed_at": "2026-08-08T10:15:03Z",
                "is_realtime": true
            }"#,
        )
        .unwrap();
        assert!(record.online_status);
        assert!(record.last_seen.is_some());
        assert!(record.computed_at.is_some());
        assert!(record.is_realtime);
    }

    #[test]
    fn missing_fields_degrade_to_defaults() {
        let record: PresenceRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record, PresenceRecord::never_seen());
    }

    #[test]
    fn null_last_seen_is_none() {
        let record: PresenceRecord =
            serde_json::from_str(r#"{"online_status": false, "last_seen": null}"#).unwrap();
        assert!(record.last_seen.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record: PresenceRecord = serde_json::from_str(
            r#"{"online_status": true, "shard": "eu-3", "ttl": 45}"#,
        )
        .unwrap();
        assert!(record.online_status);
    }

    #[test]
    fn array_body_yields_first_record() {
        let body: StatusBody = serde_json::from_str(
            r#"[{"online_status": true}, {"online_status": false}]"#,
        )
        .unwrap();
        let record = body.into_record().unwrap();
        assert!(record.online_status);
    }

    #[test]
    fn empty_array_body_yields_none() {
        let body: StatusBody = serde_json::from_str("[]").unwrap();
        assert!(body.into_record().is_none());
    }

    #[test]
    fn status_update_serializes_wire_shape() {
        let body = serde_json::to_string(&StatusUpdate { online: true }).unwrap();
        assert_eq!(body, r#"{"online":true}"#);
    }
}
