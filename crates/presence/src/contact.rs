//! Contact-list entries and their presence-aware ordering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use mingle_api::PresenceRecord;

use crate::status::{ConnectionStatus, derive_status};

/// Static profile fields for a contact. Presence is the only mutable
/// part of the enclosing [`ContactEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactProfile {
    pub user_id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    /// Section the contact is displayed under (relationship category).
    pub category: String,
}

/// A presence record as ingested on this device.
///
/// `last_seen_local` is `last_seen` shifted onto the client clock by the
/// `fetched_at - computed_at` offset when the server supplied
/// `computed_at`; without it the timestamp is taken at face value.
/// Snapshots are immutable — a refresh replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSnapshot {
    pub record: PresenceRecord,
    pub last_seen_local: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl PresenceSnapshot {
    pub fn ingest(record: PresenceRecord, fetched_at: DateTime<Utc>) -> Self {
        let last_seen_local = record.last_seen.map(|seen| match record.computed_at {
            Some(computed) => seen + (fetched_at - computed),
            None => seen,
        });
        Self {
            record,
            last_seen_local,
            fetched_at,
        }
    }

    /// Derive the display status for this snapshot at `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> ConnectionStatus {
        derive_status(self.record.online_status, self.last_seen_local, now)
    }
}

/// One contact row: static profile plus the latest presence snapshot and
/// its derived display status.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactEntry {
    pub profile: ContactProfile,
    pub presence: Option<PresenceSnapshot>,
    pub status: ConnectionStatus,
    /// Client instant of the last successful fetch for this entry.
    pub last_updated: Option<DateTime<Utc>>,
}

impl ContactEntry {
    /// Entry with no presence data (not yet fetched, or unobtainable).
    pub fn unknown(profile: ContactProfile) -> Self {
        Self {
            profile,
            presence: None,
            status: ConnectionStatus::unknown(),
            last_updated: None,
        }
    }

    /// Entry carrying a freshly fetched snapshot.
    pub fn with_snapshot(
        profile: ContactProfile,
        snapshot: PresenceSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        let status = snapshot.status_at(now);
        Self {
            profile,
            presence: Some(snapshot),
            status,
            last_updated: Some(now),
        }
    }
}

/// Named display section. Membership is static; entry ordering is
/// re-derived on every refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSection {
    pub title: String,
    pub entries: Vec<ContactEntry>,
}

/// Group entries into alphabetically ordered sections by category and
/// sort each section.
pub fn into_sections(entries: Vec<ContactEntry>) -> Vec<ContactSection> {
    let mut grouped: BTreeMap<String, Vec<ContactEntry>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.profile.category.clone())
            .or_default()
            .push(entry);
    }

    grouped
        .into_iter()
        .map(|(title, mut entries)| {
            sort_entries(&mut entries);
            ContactSection { title, entries }
        })
        .collect()
}

/// Sort a section: presence priority first, then case-insensitive full
/// name. The sort is stable and the key total, so re-sorting an already
/// sorted slice is a no-op.
pub fn sort_entries(entries: &mut [ContactEntry]) {
    entries.sort_by(|a, b| {
        a.status
            .state
            .priority()
            .cmp(&b.status.state.priority())
            .then_with(|| {
                a.profile
                    .full_name
                    .to_lowercase()
                    .cmp(&b.profile.full_name.to_lowercase())
            })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnectionState;
    use chrono::TimeDelta;

    fn profile(user_id: &str, name: &str, category: &str) -> ContactProfile {
        ContactProfile {
            user_id: user_id.to_string(),
            full_name: name.to_string(),
            avatar_url: None,
            category: category.to_string(),
        }
    }

    fn record(online: bool, last_seen: Option<DateTime<Utc>>) -> PresenceRecord {
        PresenceRecord {
            online_status: online,
            last_seen,
            computed_at: None,
            is_realtime: false,
        }
    }

    fn entry_seen_ago(user_id: &str, name: &str, secs_ago: i64, now: DateTime<Utc>) -> ContactEntry {
        let snapshot =
            PresenceSnapshot::ingest(record(false, Some(now - TimeDelta::seconds(secs_ago))), now);
        ContactEntry::with_snapshot(profile(user_id, name, "Friends"), snapshot, now)
    }

    // ── Snapshot ingestion ────────────────────────────────────────

    #[test]
    fn ingest_without_computed_at_keeps_last_seen() {
        let now = Utc::now();
        let seen = now - TimeDelta::seconds(200);
        let snapshot = PresenceSnapshot::ingest(record(false, Some(seen)), now);
        assert_eq!(snapshot.last_seen_local, Some(seen));
    }

    #[test]
    fn ingest_shifts_last_seen_by_server_clock_offset() {
        let now = Utc::now();
        // Server clock runs 60s ahead of the client: computed_at is in the
        // client's future even though the server produced it "now".
        let server_now = now + TimeDelta::seconds(60);
        let seen = server_now - TimeDelta::seconds(200);

        let mut rec = record(false, Some(seen));
        rec.computed_at = Some(server_now);
        let snapshot = PresenceSnapshot::ingest(rec, now);

        // On the client clock the contact was seen 200s ago, not 140s.
        assert_eq!(snapshot.last_seen_local, Some(now - TimeDelta::seconds(200)));
        let status = snapshot.status_at(now);
        assert_eq!(status.state, ConnectionState::RecentlyOnline);
    }

    #[test]
    fn ingest_without_last_seen_has_no_local_timestamp() {
        let snapshot = PresenceSnapshot::ingest(record(false, None), Utc::now());
        assert!(snapshot.last_seen_local.is_none());
    }

    // ── Sorting ───────────────────────────────────────────────────

    #[test]
    fn sorts_by_priority_then_name() {
        let now = Utc::now();
        let online = {
            let snapshot = PresenceSnapshot::ingest(record(true, None), now);
            ContactEntry::with_snapshot(profile("a", "Zoe", "Friends"), snapshot, now)
        };
        let recent = entry_seen_ago("b", "Alice", 200, now);
        let offline = entry_seen_ago("c", "Bob", 5000, now);
        let unknown = ContactEntry::unknown(profile("d", "Amy", "Friends"));

        let mut entries = vec![unknown.clone(), offline.clone(), recent.clone(), online.clone()];
        sort_entries(&mut entries);

        let order: Vec<&str> = entries.iter().map(|e| e.profile.user_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(entries[0].status.state, ConnectionState::Online);
        assert_eq!(entries[1].status.state, ConnectionState::RecentlyOnline);
        assert_eq!(entries[2].status.state, ConnectionState::Offline);
        assert_eq!(entries[3].status.state, ConnectionState::Unknown);
    }

    #[test]
    fn name_tiebreak_is_case_insensitive() {
        let now = Utc::now();
        let mut entries = vec![
            entry_seen_ago("1", "bob", 100, now),
            entry_seen_ago("2", "Alice", 100, now),
            entry_seen_ago("3", "CARL", 100, now),
        ];
        sort_entries(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.profile.full_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "bob", "CARL"]);
    }

    #[test]
    fn sorting_twice_is_a_no_op() {
        let now = Utc::now();
        let mut entries = vec![
            entry_seen_ago("1", "bob", 100, now),
            ContactEntry::unknown(profile("2", "ann", "Friends")),
            entry_seen_ago("3", "ann", 100, now),
            entry_seen_ago("4", "Bob", 5000, now),
        ];
        sort_entries(&mut entries);
        let once = entries.clone();
        sort_entries(&mut entries);
        assert_eq!(entries, once);
    }

    #[test]
    fn sections_are_grouped_and_alphabetical() {
        let now = Utc::now();
        let entries = vec![
            ContactEntry::unknown(profile("1", "Nina", "Work")),
            ContactEntry::unknown(profile("2", "Omar", "Family")),
            entry_seen_ago("3", "Pia", 100, now),
        ];
        let sections = into_sections(entries);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Family", "Friends", "Work"]);
        assert_eq!(sections[1].entries[0].profile.user_id, "3");
    }
}
