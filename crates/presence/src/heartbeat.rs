//! Device-side heartbeat loop.
//!
//! Keeps the backend's view of "is this device online" consistent with
//! the application's foreground/background lifecycle using the minimum
//! number of network writes. The transition table lives in
//! [`HeartbeatMachine`], a pure struct; [`HeartbeatController`] drives it
//! against real timers and the presence API.
//!
//! Write failures are logged and absorbed, never propagated: the next
//! periodic heartbeat self-heals a missed write.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mingle_api::PresenceApi;
use mingle_core::config::PresenceConfig;
use mingle_core::identity::Identity;

/// Application lifecycle signal, delivered by the embedding screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    Foregrounded,
    Backgrounded,
}

/// Lifecycle phase of a heartbeat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    /// No user id / token yet, or logged out again.
    #[default]
    Inactive,
    Foreground,
    Background,
}

/// What the driver must do with the heartbeat timer after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Cancel any live timer, then start a fresh one. Never stacks.
    Start,
    Cancel,
    Keep,
}

/// Output of feeding one input to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status value to write, if any. Subject to the dedup cache.
    pub write: Option<bool>,
    pub timer: TimerCommand,
}

impl Transition {
    fn none() -> Self {
        Self {
            write: None,
            timer: TimerCommand::Keep,
        }
    }
}

/// Pure transition table for the heartbeat state machine.
///
/// Also owns the `last_sent` dedup cache: a write whose value equals the
/// last *successfully sent* value is suppressed, except for the periodic
/// keep-alive tick, which is the mechanism by which the server infers
/// liveness and therefore always goes out.
#[derive(Debug, Default)]
pub struct HeartbeatMachine {
    phase: LifecyclePhase,
    last_sent: Option<bool>,
}

impl HeartbeatMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn last_sent(&self) -> Option<bool> {
        self.last_sent
    }

    /// Identity became available; the session starts foregrounded.
    pub fn on_session_started(&mut self) -> Transition {
        if self.phase != LifecyclePhase::Inactive {
            return Transition::none();
        }
        self.phase = LifecyclePhase::Foreground;
        // A previous session's cache must not suppress this session's
        // first online write.
        self.last_sent = None;
        Transition {
            write: Some(true),
            timer: TimerCommand::Start,
        }
    }

    /// Logout or identity loss.
    pub fn on_session_ended(&mut self) -> Transition {
        if self.phase == LifecyclePhase::Inactive {
            return Transition::none();
        }
        self.phase = LifecyclePhase::Inactive;
        Transition {
            write: Some(false),
            timer: TimerCommand::Cancel,
        }
    }

    /// App returned to (or redundantly reported) the foreground.
    pub fn on_foregrounded(&mut self) -> Transition {
        match self.phase {
            LifecyclePhase::Inactive => Transition::none(),
            // A redundant signal still requests an online write; the dedup
            // cache suppresses the duplicate network call.
            LifecyclePhase::Foreground | LifecyclePhase::Background => {
                self.phase = LifecyclePhase::Foreground;
                Transition {
                    write: Some(true),
                    timer: TimerCommand::Start,
                }
            }
        }
    }

    /// App left the foreground.
    pub fn on_backgrounded(&mut self) -> Transition {
        match self.phase {
            LifecyclePhase::Inactive => Transition::none(),
            LifecyclePhase::Foreground | LifecyclePhase::Background => {
                self.phase = LifecyclePhase::Background;
                Transition {
                    write: Some(false),
                    timer: TimerCommand::Cancel,
                }
            }
        }
    }

    /// Periodic keep-alive. Only meaningful while foregrounded; the
    /// returned write bypasses the dedup cache.
    pub fn on_tick(&self) -> Option<bool> {
        matches!(self.phase, LifecyclePhase::Foreground).then_some(true)
    }

    /// Dedup check: false iff the last successful send carried `online`.
    pub fn should_send(&self, online: bool) -> bool {
        self.last_sent != Some(online)
    }

    /// Record a successful write. Failed writes leave the cache untouched
    /// so the next attempt naturally retries the same value.
    pub fn mark_sent(&mut self, online: bool) {
        self.last_sent = Some(online);
    }
}

/// Handle held by the owning screen. Cloneable; `shutdown()` stops the
/// controller task, which then flushes a best-effort offline write.
#[derive(Debug, Clone)]
pub struct HeartbeatHandle {
    events: mpsc::Sender<AppLifecycleEvent>,
    cancel: CancellationToken,
}

impl HeartbeatHandle {
    /// Forward an app lifecycle signal to the state machine.
    pub async fn notify(&self, event: AppLifecycleEvent) {
        if self.events.send(event).await.is_err() {
            debug!(?event, "heartbeat controller stopped, dropping lifecycle event");
        }
    }

    /// Stop the controller. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Owns one device's presence lifecycle: reports online on session start
/// and foregrounding, offline on backgrounding and teardown, and a
/// periodic keep-alive in between.
///
/// Exactly one heartbeat timer can be live at a time: the run loop holds
/// a single `Option<Interval>` slot and every start reassigns it.
pub struct HeartbeatController<C> {
    client: Arc<C>,
    identity: watch::Receiver<Option<Identity>>,
    events: mpsc::Receiver<AppLifecycleEvent>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
    offline_flush_timeout: Duration,
    machine: HeartbeatMachine,
}

impl<C: PresenceApi> HeartbeatController<C> {
    pub fn new(
        client: Arc<C>,
        identity: watch::Receiver<Option<Identity>>,
        config: &PresenceConfig,
    ) -> (Self, HeartbeatHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let handle = HeartbeatHandle {
            events: events_tx,
            cancel: cancel.clone(),
        };
        let controller = Self {
            client,
            identity,
            events: events_rx,
            cancel,
            heartbeat_interval: config.heartbeat_interval(),
            offline_flush_timeout: config.offline_flush_timeout(),
            machine: HeartbeatMachine::new(),
        };
        (controller, handle)
    }

    /// Drive the session until the handle is shut down or the identity
    /// store goes away. Spawn this on the screen's runtime; the task owns
    /// the heartbeat timer, so no timer outlives the screen.
    pub async fn run(self) {
        let HeartbeatController {
            client,
            mut identity,
            mut events,
            cancel,
            heartbeat_interval,
            offline_flush_timeout,
            mut machine,
        } = self;

        let mut ticker: Option<Interval> = None;
        let mut current_user: Option<String> = None;

        // An identity already present at startup begins the session
        // immediately.
        let startup_identity = identity.borrow_and_update().clone();
        if let Some(id) = startup_identity {
            current_user = Some(id.user_id);
            let transition = machine.on_session_started();
            apply(
                &*client,
                &mut machine,
                current_user.as_deref(),
                transition,
                &mut ticker,
                heartbeat_interval,
            )
            .await;
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                changed = identity.changed() => {
                    if changed.is_err() {
                        // Identity store dropped; tear down.
                        break;
                    }
                    let next = identity.borrow_and_update().clone();
                    match next {
                        Some(id) => {
                            if current_user.as_deref() != Some(id.user_id.as_str()) {
                                // Account switch: close out the old session
                                // before starting the new one.
                                let transition = machine.on_session_ended();
                                apply(&*client, &mut machine, current_user.as_deref(),
                                      transition, &mut ticker, heartbeat_interval).await;
                                current_user = Some(id.user_id);
                                let transition = machine.on_session_started();
                                apply(&*client, &mut machine, current_user.as_deref(),
                                      transition, &mut ticker, heartbeat_interval).await;
                            }
                        }
                        None => {
                            let transition = machine.on_session_ended();
                            apply(&*client, &mut machine, current_user.as_deref(),
                                  transition, &mut ticker, heartbeat_interval).await;
                            current_user = None;
                        }
                    }
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        // Every handle dropped; the owning screen is gone.
                        break;
                    };
                    let transition = match event {
                        AppLifecycleEvent::Foregrounded => machine.on_foregrounded(),
                        AppLifecycleEvent::Backgrounded => machine.on_backgrounded(),
                    };
                    apply(&*client, &mut machine, current_user.as_deref(),
                          transition, &mut ticker, heartbeat_interval).await;
                }

                _ = tick(&mut ticker) => {
                    if let Some(online) = machine.on_tick() {
                        if let Some(user_id) = current_user.as_deref() {
                            write_status(&*client, &mut machine, user_id, online, true).await;
                        }
                    }
                }
            }
        }

        drop(ticker);

        // Best-effort final offline write, bounded so teardown cannot
        // hang on a dead backend. Suppressed by the dedup cache when the
        // device already reported offline.
        if machine.phase() != LifecyclePhase::Inactive {
            if let Some(user_id) = current_user.as_deref() {
                let flush = write_status(&*client, &mut machine, user_id, false, false);
                if time::timeout(offline_flush_timeout, flush).await.is_err() {
                    warn!(user_id, "offline flush timed out during teardown");
                }
            }
        }
    }
}

/// Await the next heartbeat tick, or forever if no timer is live.
async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Execute one transition: adjust the timer slot, then route the write
/// through the deduplicating send path.
async fn apply<C: PresenceApi>(
    client: &C,
    machine: &mut HeartbeatMachine,
    user_id: Option<&str>,
    transition: Transition,
    ticker: &mut Option<Interval>,
    period: Duration,
) {
    match transition.timer {
        TimerCommand::Start => {
            // Reassigning the slot drops any previous timer:
            // cancel-then-start, never stacked.
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ticker = Some(interval);
        }
        TimerCommand::Cancel => *ticker = None,
        TimerCommand::Keep => {}
    }

    if let (Some(online), Some(user_id)) = (transition.write, user_id) {
        write_status(client, machine, user_id, online, false).await;
    }
}

/// The single deduplicating write path. Lifecycle transitions respect the
/// cache; the periodic keep-alive passes `force` because repetition is
/// its purpose. Failures are logged and absorbed — the cache is only
/// updated on success, so the value is retried naturally.
async fn write_status<C: PresenceApi>(
    client: &C,
    machine: &mut HeartbeatMachine,
    user_id: &str,
    online: bool,
    force: bool,
) {
    if !force && !machine.should_send(online) {
        debug!(user_id, online, "suppressing duplicate status write");
        return;
    }
    match client.publish_status(user_id, online).await {
        Ok(()) => machine.mark_sent(online),
        Err(e) => {
            warn!(user_id, online, error = %e, "status write failed; next heartbeat will retry");
        }
    }
}
