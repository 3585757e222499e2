use clap::builder::TypedValueParser as _;
use clap::Parser;
use delivery::connection::{DEFAULT_CONNECTION_BUFFER_SIZE, DEFAULT_MAX_CONNECTIONS_PER_DEVICE};
use delivery::queue::DEFAULT_QUEUE_PREFIX;
use delivery::Sealer;
use dotenvy::dotenv;
use log::LevelFilter;
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

/// A configuration value that cannot be used to start the server.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid configuration: {}", self.0)
    }
}

impl StdError for ConfigError {}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,

    /// Maximum live connections one user may hold per device class
    #[arg(long, env, default_value_t = DEFAULT_MAX_CONNECTIONS_PER_DEVICE)]
    pub max_connections_per_device: usize,

    /// Envelopes buffered per connection before writes start to block
    #[arg(long, env, default_value_t = DEFAULT_CONNECTION_BUFFER_SIZE)]
    pub connection_buffer_size: usize,

    /// Milliseconds a single connection write may take during fan-out
    #[arg(long, env, default_value_t = 2000)]
    pub write_timeout_ms: u64,

    /// Non-human accounts whose own messages are never echoed back to them
    #[arg(long, env, value_delimiter = ',', use_value_delimiter = true)]
    pub system_user_ids: Vec<String>,

    /// Encrypt envelope payloads per user, on the wire and at rest
    #[arg(long, env, default_value_t = false)]
    pub seal_enabled: bool,

    /// 64 hex characters; per-user keys are derived from it
    #[arg(long, env)]
    seal_master_key: Option<String>,

    /// Prefix of the per-user offline queue names
    #[arg(long, env, default_value = DEFAULT_QUEUE_PREFIX)]
    pub offline_queue_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn set_seal_master_key(mut self, key: String) -> Self {
        self.seal_master_key = Some(key);
        self
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    /// The sealer built from the master key, or `None` when sealing is off.
    pub fn sealer(&self) -> Result<Option<Sealer>, ConfigError> {
        if !self.seal_enabled {
            return Ok(None);
        }

        let key = self
            .seal_master_key
            .as_deref()
            .ok_or_else(|| ConfigError("seal_enabled requires seal_master_key".to_string()))?;

        Sealer::from_hex(key)
            .map(Some)
            .map_err(|e| ConfigError(format!("seal_master_key: {e}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections_per_device == 0 {
            return Err(ConfigError(
                "max_connections_per_device must be at least 1".to_string(),
            ));
        }
        if self.connection_buffer_size == 0 {
            return Err(ConfigError(
                "connection_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.offline_queue_prefix.is_empty() {
            return Err(ConfigError("offline_queue_prefix must not be empty".to_string()));
        }
        self.sealer().map(|_| ())
    }
}
