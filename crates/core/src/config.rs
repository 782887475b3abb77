use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid TOML at line {line}, column {column}: {message}")]
    InvalidToml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("missing required fields: {fields:?}")]
    MissingRequiredFields { fields: Vec<String> },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the presence REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Timing knobs for the heartbeat loop and the contact-list refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Period of the foreground keep-alive write.
    pub heartbeat_interval_secs: u64,
    /// Period of the full contact-list re-fetch.
    pub refresh_interval_secs: u64,
    /// Period of the fetch-free "time since" label recomputation.
    pub retick_interval_secs: u64,
    /// Upper bound on the final best-effort offline write at teardown.
    pub offline_flush_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            refresh_interval_secs: 30,
            retick_interval_secs: 10,
            offline_flush_timeout_ms: 1500,
            retry: RetryConfig::default(),
        }
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retick_interval(&self) -> Duration {
        Duration::from_secs(self.retick_interval_secs)
    }

    pub fn offline_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_flush_timeout_ms)
    }
}

/// Per-contact read retry policy. Linear backoff: the wait after attempt
/// `n` is `n * backoff_step_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ConfigOverrides {
    base_url: Option<String>,
    log_level: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Load configuration from a specific path, merging environment variable
/// overrides. Returns a validated Config or a descriptive error.
pub fn load_config_from(path: PathBuf) -> Result<Config, ConfigError> {
    load_config_from_with_overrides(path, config_overrides_from_env())
}

/// Parse configuration from a TOML string directly (for testing).
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    load_config_from_str_with_overrides(toml_str, config_overrides_from_env())
}

fn load_config_from_with_overrides(
    path: PathBuf,
    overrides: ConfigOverrides,
) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound { path });
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    load_config_from_str_with_overrides(&contents, overrides)
}

fn load_config_from_str_with_overrides(
    toml_str: &str,
    overrides: ConfigOverrides,
) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(toml_str).map_err(|e| {
        let (line, column) = e.span().map_or((0, 0), |span| {
            let before = &toml_str[..span.start];
            let line = before.chars().filter(|&c| c == '\n').count() + 1;
            let column = before
                .rfind('\n')
                .map_or(span.start + 1, |nl| span.start - nl);
            (line, column)
        });
        ConfigError::InvalidToml {
            line,
            column,
            message: e.message().to_string(),
        }
    })?;

    apply_overrides(&mut config, overrides);
    validate(&config)?;

    Ok(config)
}

fn config_overrides_from_env() -> ConfigOverrides {
    ConfigOverrides {
        base_url: std::env::var("MINGLE_API_BASE_URL").ok(),
        log_level: std::env::var("MINGLE_LOG_LEVEL").ok(),
    }
}

fn apply_overrides(config: &mut Config, overrides: ConfigOverrides) {
    if let Some(base_url) = overrides.base_url {
        config.api.base_url = base_url;
    }
    if let Some(level) = overrides.log_level {
        config.logging.level = level;
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api.base_url.is_empty() {
        return Err(ConfigError::MissingRequiredFields {
            fields: vec!["api.base_url".to_string()],
        });
    }

    if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            message: format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
        });
    }

    if config.presence.retry.max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "presence.retry.max_attempts".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    for (field, value) in [
        (
            "presence.heartbeat_interval_secs",
            config.presence.heartbeat_interval_secs,
        ),
        (
            "presence.refresh_interval_secs",
            config.presence.refresh_interval_secs,
        ),
        (
            "presence.retick_interval_secs",
            config.presence.retick_interval_secs,
        ),
    ] {
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
    }

    Ok(())
}
