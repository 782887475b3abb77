pub mod aggregator;
pub mod contact;
pub mod feed;
pub mod heartbeat;
pub mod status;

pub use aggregator::{PresenceAggregator, RetryPolicy};
pub use contact::{ContactEntry, ContactProfile, ContactSection, PresenceSnapshot};
pub use feed::{PresenceFeed, PresenceFeedHandle};
pub use heartbeat::{
    AppLifecycleEvent, HeartbeatController, HeartbeatHandle, HeartbeatMachine, LifecyclePhase,
    TimerCommand, Transition,
};
pub use status::{ConnectionState, ConnectionStatus, derive_status, elapsed_label};
