pub mod client;
pub mod error;
pub mod record;

pub use client::{PresenceApi, PresenceClient};
pub use error::ApiError;
pub use record::PresenceRecord;
