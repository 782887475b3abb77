//! Derived connection status and "time since" bucketing.
//!
//! Everything here is a pure function of `(online_status, last_seen, now)`
//! so display code can recompute it on every tick without I/O.

use chrono::{DateTime, Utc};

/// Seconds within which an offline contact still counts as recently online.
const RECENTLY_ONLINE_WINDOW_SECS: i64 = 300;

/// Seconds after which a contact is plainly offline.
const OFFLINE_THRESHOLD_SECS: i64 = 3600;

/// Coarse display bucket for a contact's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Online,
    RecentlyOnline,
    RecentlyActive,
    Offline,
    Unknown,
}

impl ConnectionState {
    /// Sort priority across a section; lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            ConnectionState::Online => 0,
            ConnectionState::RecentlyOnline => 1,
            ConnectionState::RecentlyActive => 2,
            ConnectionState::Offline => 3,
            ConnectionState::Unknown => 4,
        }
    }

    /// Display color (hex).
    pub fn color(self) -> &'static str {
        match self {
            ConnectionState::Online => "#4caf50",
            ConnectionState::RecentlyOnline => "#8bc34a",
            ConnectionState::RecentlyActive => "#ffb300",
            ConnectionState::Offline => "#9e9e9e",
            ConnectionState::Unknown => "#607d8b",
        }
    }
}

/// Derived, ephemeral display status.
///
/// Created fresh on every derivation pass and replaced wholesale — never
/// mutated in place — so a concurrent refresh can never observe a
/// half-updated label/color pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub label: String,
    pub color: &'static str,
}

impl ConnectionStatus {
    /// Sentinel for contacts whose presence could not be determined.
    pub fn unknown() -> Self {
        Self {
            state: ConnectionState::Unknown,
            label: "Unknown".to_string(),
            color: ConnectionState::Unknown.color(),
        }
    }
}

/// Derive the display status for one contact.
///
/// An online contact is `Online` no matter what `last_seen` says; the
/// timestamp only grades shades of offline.
pub fn derive_status(
    online_status: bool,
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ConnectionStatus {
    if online_status {
        return ConnectionStatus {
            state: ConnectionState::Online,
            label: "Online".to_string(),
            color: ConnectionState::Online.color(),
        };
    }

    let Some(last_seen) = last_seen else {
        return ConnectionStatus::unknown();
    };

    // Clock skew can put last_seen in the future; clamp instead of
    // underflowing into a bogus bucket.
    let elapsed = (now - last_seen).num_seconds().max(0);
    let state = if elapsed < RECENTLY_ONLINE_WINDOW_SECS {
        ConnectionState::RecentlyOnline
    } else if elapsed < OFFLINE_THRESHOLD_SECS {
        ConnectionState::RecentlyActive
    } else {
        ConnectionState::Offline
    };

    ConnectionStatus {
        state,
        label: elapsed_label(elapsed),
        color: state.color(),
    }
}

/// Human-readable "time since" bucket for an elapsed duration in seconds.
///
/// Bucket boundaries are display contract; divisions floor.
pub fn elapsed_label(elapsed_secs: i64) -> String {
    let secs = elapsed_secs.max(0);
    if secs < 30 {
        "just now".to_string()
    } else if secs < 60 {
        "<1 min ago".to_string()
    } else if secs < 120 {
        "1 min ago".to_string()
    } else if secs < 3600 {
        format!("{} min ago", secs / 60)
    } else if secs < 7200 {
        "1 h ago".to_string()
    } else if secs < 86_400 {
        format!("{} h ago", secs / 3600)
    } else if secs < 172_800 {
        "1 day ago".to_string()
    } else if secs < 2_592_000 {
        format!("{} days ago", secs / 86_400)
    } else if secs < 5_184_000 {
        "1 month ago".to_string()
    } else if secs < 31_536_000 {
        format!("{} months ago", secs / 2_592_000)
    } else {
        "a long time ago".to_string()
    }
}
