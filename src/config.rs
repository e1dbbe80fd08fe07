//! Process configuration from environment variables.
//!
//! Handles are constructed once from this config at startup and injected
//! into handlers and consumers; nothing reads the environment after boot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default listen address.
const DEFAULT_LISTEN_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);

/// Default data directory; the store and queue live under it.
const DEFAULT_DATA_DIR: &str = "./data";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable is set but unparseable.
    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

/// Runtime configuration for the intake process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    ///
    /// `WEBHOOK_INTAKE_ADDR`, default `0.0.0.0:3000`.
    pub listen_addr: SocketAddr,

    /// Root directory for durable state. Processed-event records live in
    /// `<data_dir>/processed_events`, queue entries in `<data_dir>/queue`.
    ///
    /// `WEBHOOK_INTAKE_DATA_DIR`, default `./data`.
    pub data_dir: PathBuf,

    /// Stripe webhook signing secret (`whsec_...`).
    ///
    /// `STRIPE_WEBHOOK_SECRET`, required.
    pub stripe_secret: Vec<u8>,

    /// Interval between queue consumer scans.
    ///
    /// `WEBHOOK_INTAKE_POLL_INTERVAL_SECS`, default 5.
    pub poll_interval: Duration,

    /// Interval between retention sweeps.
    ///
    /// `WEBHOOK_INTAKE_SWEEP_INTERVAL_SECS`, default 21600 (6 hours).
    pub sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = match std::env::var("WEBHOOK_INTAKE_ADDR") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidVar {
                    name: "WEBHOOK_INTAKE_ADDR",
                    value,
                })?,
            Err(_) => SocketAddr::from(DEFAULT_LISTEN_ADDR),
        };

        let data_dir = std::env::var("WEBHOOK_INTAKE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        let stripe_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map(String::into_bytes)
            .map_err(|_| ConfigError::MissingVar("STRIPE_WEBHOOK_SECRET"))?;

        Ok(Config {
            listen_addr,
            data_dir,
            stripe_secret,
            poll_interval: duration_var("WEBHOOK_INTAKE_POLL_INTERVAL_SECS", 5)?,
            sweep_interval: duration_var("WEBHOOK_INTAKE_SWEEP_INTERVAL_SECS", 6 * 3600)?,
        })
    }

    /// Directory for processed-event records.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("processed_events")
    }

    /// Root directory for queue entries.
    pub fn queue_dir(&self) -> PathBuf {
        self.data_dir.join("queue")
    }
}

/// Reads a duration-in-seconds variable with a default.
fn duration_var(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => {
            let secs = value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidVar { name, value })?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
