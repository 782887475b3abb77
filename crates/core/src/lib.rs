pub mod config;
pub mod error;
pub mod identity;
pub mod telemetry;

pub use config::{ApiConfig, Config, ConfigError, LoggingConfig, PresenceConfig, RetryConfig};
pub use error::{MingleError, Result};
pub use identity::{Identity, IdentityStore};
