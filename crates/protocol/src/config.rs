//! Runtime configuration.
//!
//! One explicit struct, loadable from `DROPGATE_`-prefixed environment
//! variables. Every knob has a documented default in [`crate::constants`].

use std::time::Duration;

use crate::constants::{
    DEFAULT_KEEP_ALIVE, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MAX_RECONNECT_BACKOFF, DEFAULT_MIN_CHUNK_SIZE, DEFAULT_REPLAY_BUFFER_DEPTH,
    DEFAULT_SESSION_TTL, DEFAULT_SUBSCRIBER_QUEUE_DEPTH, DEFAULT_SWEEP_INTERVAL,
};

/// Error raised when the environment holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("{0}")]
    Inconsistent(String),
}

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest accepted `declaredTotalSize`, in bytes.
    pub max_file_size: u64,
    /// Upper bound on the negotiated chunk size, in bytes.
    pub max_chunk_size: u64,
    /// Lower bound on the negotiated chunk size, in bytes.
    pub min_chunk_size: u64,
    /// Inactivity window before a session expires.
    pub session_ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
    /// Keep-alive interval on the event stream.
    pub keep_alive: Duration,
    /// Cap on the client's reconnect backoff.
    pub max_reconnect_backoff: Duration,
    /// Events retained per workspace for replay on resume.
    pub replay_buffer_depth: usize,
    /// Capacity of one subscriber's delivery queue.
    pub subscriber_queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            keep_alive: DEFAULT_KEEP_ALIVE,
            max_reconnect_backoff: DEFAULT_MAX_RECONNECT_BACKOFF,
            replay_buffer_depth: DEFAULT_REPLAY_BUFFER_DEPTH,
            subscriber_queue_depth: DEFAULT_SUBSCRIBER_QUEUE_DEPTH,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Unset variables keep their defaults. Recognized variables:
    /// `DROPGATE_MAX_FILE_SIZE`, `DROPGATE_MAX_CHUNK_SIZE`,
    /// `DROPGATE_MIN_CHUNK_SIZE`, `DROPGATE_SESSION_TTL_SECS`,
    /// `DROPGATE_SWEEP_INTERVAL_SECS`, `DROPGATE_KEEP_ALIVE_SECS`,
    /// `DROPGATE_MAX_RECONNECT_BACKOFF_SECS`,
    /// `DROPGATE_REPLAY_BUFFER_DEPTH`, `DROPGATE_SUBSCRIBER_QUEUE_DEPTH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u64>("DROPGATE_MAX_FILE_SIZE")? {
            config.max_file_size = v;
        }
        if let Some(v) = parse_var::<u64>("DROPGATE_MAX_CHUNK_SIZE")? {
            config.max_chunk_size = v;
        }
        if let Some(v) = parse_var::<u64>("DROPGATE_MIN_CHUNK_SIZE")? {
            config.min_chunk_size = v;
        }
        if let Some(v) = parse_var::<u64>("DROPGATE_SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("DROPGATE_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("DROPGATE_KEEP_ALIVE_SECS")? {
            config.keep_alive = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("DROPGATE_MAX_RECONNECT_BACKOFF_SECS")? {
            config.max_reconnect_backoff = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<usize>("DROPGATE_REPLAY_BUFFER_DEPTH")? {
            config.replay_buffer_depth = v;
        }
        if let Some(v) = parse_var::<usize>("DROPGATE_SUBSCRIBER_QUEUE_DEPTH")? {
            config.subscriber_queue_depth = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency of the size bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "min_chunk_size must be positive".into(),
            ));
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "min_chunk_size {} exceeds max_chunk_size {}",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        if self.max_chunk_size > self.max_file_size {
            return Err(ConfigError::Inconsistent(format!(
                "max_chunk_size {} exceeds max_file_size {}",
                self.max_chunk_size, self.max_file_size
            )));
        }
        if self.subscriber_queue_depth == 0 {
            return Err(ConfigError::Inconsistent(
                "subscriber_queue_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.into(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_chunk_bounds() {
        let config = Config {
            min_chunk_size: 10,
            max_chunk_size: 5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_chunk_larger_than_file() {
        let config = Config {
            max_chunk_size: 100,
            max_file_size: 50,
            min_chunk_size: 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_queue_depth() {
        let config = Config {
            subscriber_queue_depth: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
