//! Periodically refreshed contact-list presence view.
//!
//! One feed per mounted contact-list screen. The run loop is the sole
//! writer of the published sections, so the coarse refresh pass and the
//! fine display retick can never interleave writes to the same entry.
//! Cancellation wins every select: a fetch that resolves after shutdown
//! is discarded, never published.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mingle_api::PresenceApi;
use mingle_core::config::PresenceConfig;

use crate::aggregator::PresenceAggregator;
use crate::contact::{ContactProfile, ContactSection};

/// Handle held by the owning screen.
#[derive(Debug, Clone)]
pub struct PresenceFeedHandle {
    sections: watch::Receiver<Vec<ContactSection>>,
    cancel: CancellationToken,
}

impl PresenceFeedHandle {
    /// Subscribe to the published view. The initial value is empty until
    /// the first load completes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ContactSection>> {
        self.sections.clone()
    }

    /// Snapshot of the latest published view.
    pub fn current(&self) -> Vec<ContactSection> {
        self.sections.borrow().clone()
    }

    /// Stop the feed. Idempotent; pending fetch results are discarded.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Owns the refresh and retick timers for one contact list.
pub struct PresenceFeed<C> {
    aggregator: PresenceAggregator<C>,
    profiles: Vec<ContactProfile>,
    refresh_interval: Duration,
    retick_interval: Duration,
    cancel: CancellationToken,
    tx: watch::Sender<Vec<ContactSection>>,
}

impl<C: PresenceApi> PresenceFeed<C> {
    pub fn new(
        aggregator: PresenceAggregator<C>,
        profiles: Vec<ContactProfile>,
        config: &PresenceConfig,
    ) -> (Self, PresenceFeedHandle) {
        let (tx, rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();
        let handle = PresenceFeedHandle {
            sections: rx,
            cancel: cancel.clone(),
        };
        let feed = Self {
            aggregator,
            profiles,
            refresh_interval: config.refresh_interval(),
            retick_interval: config.retick_interval(),
            cancel,
            tx,
        };
        (feed, handle)
    }

    /// Drive the view until the handle is shut down. Spawn this on the
    /// screen's runtime; both timers die with the task.
    pub async fn run(self) {
        let PresenceFeed {
            aggregator,
            profiles,
            refresh_interval,
            retick_interval,
            cancel,
            tx,
        } = self;

        let mut sections = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sections = aggregator.load_initial(profiles, Utc::now()) => sections,
        };
        tx.send_replace(sections.clone());

        let mut refresh = time::interval_at(
            time::Instant::now() + refresh_interval,
            refresh_interval,
        );
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retick = time::interval_at(
            time::Instant::now() + retick_interval,
            retick_interval,
        );
        retick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = refresh.tick() => {
                    let refreshed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        refreshed = aggregator.refresh_all(&sections, Utc::now()) => refreshed,
                    };
                    sections = refreshed;
                    tx.send_replace(sections.clone());
                }

                _ = retick.tick() => {
                    aggregator.retick_display(&mut sections, Utc::now());
                    tx.send_replace(sections.clone());
                }
            }
        }

        debug!("presence feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RetryPolicy;
    use crate::status::ConnectionState;
    use mingle_api::{ApiError, PresenceRecord};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Fake whose behavior can be flipped at runtime: healthy responses,
    /// hard failures, or hanging forever (for cancellation tests).
    #[derive(Default)]
    struct SwitchableApi {
        online: AtomicBool,
        hang: AtomicBool,
        fail: AtomicBool,
        fetches: AtomicU32,
    }

    impl PresenceApi for SwitchableApi {
        async fn fetch_status(&self, _user_id: &str) -> Result<PresenceRecord, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Transport("connection refused".to_string()));
            }
            Ok(PresenceRecord {
                online_status: self.online.load(Ordering::SeqCst),
                last_seen: None,
                computed_at: None,
                is_realtime: false,
            })
        }

        async fn publish_status(&self, _user_id: &str, _online: bool) -> Result<(), ApiError> {
            unreachable!("feed tests never publish");
        }
    }

    fn profile(user_id: &str, name: &str) -> ContactProfile {
        ContactProfile {
            user_id: user_id.to_string(),
            full_name: name.to_string(),
            avatar_url: None,
            category: "Friends".to_string(),
        }
    }

    fn feed_for(
        api: Arc<SwitchableApi>,
        config: &PresenceConfig,
    ) -> (PresenceFeed<SwitchableApi>, PresenceFeedHandle) {
        let aggregator = PresenceAggregator::new(Some(api), RetryPolicy::default());
        PresenceFeed::new(
            aggregator,
            vec![profile("a", "Ann"), profile("b", "Ben")],
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_initial_sections() {
        let api = Arc::new(SwitchableApi::default());
        api.online.store(true, Ordering::SeqCst);
        let (feed, handle) = feed_for(api, &PresenceConfig::default());
        let mut rx = handle.subscribe();
        let task = tokio::spawn(feed.run());

        rx.changed().await.unwrap();
        let sections = rx.borrow_and_update().clone();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].entries.len(), 2);
        assert_eq!(sections[0].entries[0].status.state, ConnectionState::Online);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_tick_publishes_new_statuses() {
        let api = Arc::new(SwitchableApi::default());
        api.online.store(true, Ordering::SeqCst);
        let (feed, handle) = feed_for(api.clone(), &PresenceConfig::default());
        let mut rx = handle.subscribe();
        let task = tokio::spawn(feed.run());

        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update()[0].entries[0].status.state,
            ConnectionState::Online
        );

        // The backend flips everyone offline-with-no-history before the
        // next coarse refresh.
        api.online.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_secs(31)).await;

        rx.changed().await.unwrap();
        let sections = rx.borrow_and_update().clone();
        assert_eq!(sections[0].entries[0].status.state, ConnectionState::Unknown);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn retick_publishes_between_refreshes() {
        let api = Arc::new(SwitchableApi::default());
        api.online.store(true, Ordering::SeqCst);
        let (feed, handle) = feed_for(api.clone(), &PresenceConfig::default());
        let mut rx = handle.subscribe();
        let task = tokio::spawn(feed.run());

        rx.changed().await.unwrap();
        rx.borrow_and_update();
        let fetches_after_load = api.fetches.load(Ordering::SeqCst);

        // 10s retick fires before the 30s refresh; it publishes without
        // touching the network.
        time::sleep(Duration::from_secs(11)).await;
        rx.changed().await.unwrap();
        assert_eq!(api.fetches.load(Ordering::SeqCst), fetches_after_load);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failures_keep_last_published_view() {
        let api = Arc::new(SwitchableApi::default());
        api.online.store(true, Ordering::SeqCst);
        let (feed, handle) = feed_for(api.clone(), &PresenceConfig::default());
        let mut rx = handle.subscribe();
        let task = tokio::spawn(feed.run());

        rx.changed().await.unwrap();
        let initial = rx.borrow_and_update().clone();
        assert_eq!(initial[0].entries[0].status.state, ConnectionState::Online);

        api.fail.store(true, Ordering::SeqCst);
        // Past the 30s refresh plus its 1s+2s retry backoffs.
        time::sleep(Duration::from_secs(40)).await;
        let after = rx.borrow_and_update().clone();
        assert_eq!(
            after[0].entries[0].status.state,
            ConnectionState::Online,
            "failed refresh must keep the stale status"
        );

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_mid_fetch_discards_the_result() {
        let api = Arc::new(SwitchableApi::default());
        api.hang.store(true, Ordering::SeqCst);
        let (feed, handle) = feed_for(api, &PresenceConfig::default());
        let rx = handle.subscribe();
        let task = tokio::spawn(feed.run());

        // Give the initial load a moment to get in flight, then unmount.
        tokio::task::yield_now().await;
        handle.shutdown();
        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("feed must stop promptly after shutdown")
            .unwrap();

        // Nothing was ever published.
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_timers() {
        let api = Arc::new(SwitchableApi::default());
        let (feed, handle) = feed_for(api.clone(), &PresenceConfig::default());
        let mut rx = handle.subscribe();
        let task = tokio::spawn(feed.run());

        rx.changed().await.unwrap();
        handle.shutdown();
        task.await.unwrap();
        let fetches = api.fetches.load(Ordering::SeqCst);

        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), fetches);
    }
}
