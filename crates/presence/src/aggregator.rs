//! Contact-list presence aggregation.
//!
//! Fetches presence for a bounded set of contacts with per-contact
//! bounded retry, derives display statuses, and produces stably sorted
//! sections. Individual failures degrade the affected entry — they never
//! drop a contact or fail the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time;
use tracing::{debug, warn};

use mingle_api::{PresenceApi, PresenceRecord};
use mingle_core::config::RetryConfig;

use crate::contact::{
    ContactEntry, ContactProfile, ContactSection, PresenceSnapshot, into_sections,
};
use crate::status::ConnectionStatus;

/// Per-contact read retry policy: up to `max_attempts` tries, waiting
/// `attempt * backoff_step` between them (linear, no jitter).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_step: config.backoff_step(),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Best-effort presence view over a set of contacts.
///
/// `client` is `None` when no authenticated session exists; fetches are
/// then skipped outright (not retried) and every entry surfaces as
/// unknown.
pub struct PresenceAggregator<C> {
    client: Option<Arc<C>>,
    retry: RetryPolicy,
}

impl<C: PresenceApi> PresenceAggregator<C> {
    pub fn new(client: Option<Arc<C>>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Build the initial sections for a contact list. Fetches run
    /// concurrently; a contact whose retries are exhausted is kept with
    /// the unknown sentinel rather than dropped.
    pub async fn load_initial(
        &self,
        profiles: Vec<ContactProfile>,
        now: DateTime<Utc>,
    ) -> Vec<ContactSection> {
        let entries = join_all(profiles.into_iter().map(|profile| async move {
            match self.fetch_presence(&profile.user_id).await {
                Some(record) => {
                    ContactEntry::with_snapshot(profile, PresenceSnapshot::ingest(record, now), now)
                }
                None => ContactEntry::unknown(profile),
            }
        }))
        .await;

        into_sections(entries)
    }

    /// Re-fetch presence for every displayed entry. Success replaces the
    /// snapshot, status, and `last_updated` wholesale; failure keeps the
    /// previous (possibly stale) entry rather than clearing it.
    pub async fn refresh_all(
        &self,
        sections: &[ContactSection],
        now: DateTime<Utc>,
    ) -> Vec<ContactSection> {
        let current: Vec<ContactEntry> = sections
            .iter()
            .flat_map(|section| section.entries.iter().cloned())
            .collect();

        let entries = join_all(current.into_iter().map(|entry| async move {
            match self.fetch_presence(&entry.profile.user_id).await {
                Some(record) => ContactEntry::with_snapshot(
                    entry.profile,
                    PresenceSnapshot::ingest(record, now),
                    now,
                ),
                None => entry,
            }
        }))
        .await;

        into_sections(entries)
    }

    /// Fetch-free pass: re-derive each entry's display status (state,
    /// label, color) from the snapshot it already holds. Snapshots and
    /// ordering are left untouched, so this can run far more often than
    /// [`refresh_all`](Self::refresh_all).
    pub fn retick_display(&self, sections: &mut [ContactSection], now: DateTime<Utc>) {
        for section in sections {
            for entry in &mut section.entries {
                entry.status = match &entry.presence {
                    Some(snapshot) => snapshot.status_at(now),
                    None => ConnectionStatus::unknown(),
                };
            }
        }
    }

    /// Per-contact bounded retry. `None` once the policy is exhausted or
    /// a non-retryable error surfaces; the contact is kept either way.
    async fn fetch_presence(&self, user_id: &str) -> Option<PresenceRecord> {
        let client = match &self.client {
            Some(client) => client,
            None => {
                debug!(user_id, "no authenticated session, skipping presence fetch");
                return None;
            }
        };

        let mut attempt = 1u32;
        loop {
            match client.fetch_status(user_id).await {
                Ok(record) => return Some(record),
                Err(e) if !e.is_retryable() => {
                    warn!(user_id, error = %e, "presence fetch failed, not retryable");
                    return None;
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            user_id,
                            attempts = attempt,
                            error = %e,
                            "presence fetch exhausted retries"
                        );
                        return None;
                    }
                    let delay = self.retry.delay_after(attempt);
                    debug!(
                        user_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "presence fetch failed, retrying"
                    );
                    time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
