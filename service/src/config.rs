use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use ws::HubConfig;

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

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

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

    /// Seconds a WebSocket client may stay silent (no pong) before it is dropped
    #[arg(long, env, default_value_t = 60)]
    pub ws_pong_wait_secs: u64,

    /// Seconds between keepalive pings. Defaults to 90% of the pong wait.
    #[arg(long, env)]
    pub ws_ping_period_secs: Option<u64>,

    /// Seconds allowed for a single frame write to a client
    #[arg(long, env, default_value_t = 10)]
    pub ws_write_wait_secs: u64,

    /// Largest message, in bytes, accepted from a client
    #[arg(long, env, default_value_t = 512)]
    pub ws_max_message_size: usize,

    /// Outbound queue depth per connection; a client that falls this far behind is dropped
    #[arg(long, env, default_value_t = 256)]
    pub ws_buffer_size: usize,

    /// Publish buffer depth per topic
    #[arg(long, env, default_value_t = 256)]
    pub ws_topic_buffer_size: usize,

    /// Seconds between sweeps for clients past their liveness deadline
    #[arg(long, env, default_value_t = 5)]
    pub ws_sweep_interval_secs: u64,

    /// Seconds a graceful shutdown waits for clients to drain before closing them
    #[arg(long, env, default_value_t = 5)]
    pub ws_shutdown_grace_secs: u64,
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

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }

    /// Hub settings derived from the `ws_*` options. Not validated here;
    /// `ws::Manager::start` rejects unusable values.
    pub fn hub_config(&self) -> HubConfig {
        let mut hub = HubConfig::with_pong_wait(Duration::from_secs(self.ws_pong_wait_secs));
        if let Some(secs) = self.ws_ping_period_secs {
            hub.ping_period = Duration::from_secs(secs);
        }
        hub.write_wait = Duration::from_secs(self.ws_write_wait_secs);
        hub.max_message_size = self.ws_max_message_size;
        hub.buffer_size = self.ws_buffer_size;
        hub.topic_buffer_size = self.ws_topic_buffer_size;
        hub.sweep_interval = Duration::from_secs(self.ws_sweep_interval_secs);
        hub.shutdown_grace = Duration::from_secs(self.ws_shutdown_grace_secs);
        hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("scanorama_rs").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = parse(&[]);
        assert_eq!(config.interface.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.log_level_filter, LevelFilter::Info);
        assert_eq!(config.runtime_env, RustEnv::Development);
        assert_eq!(config.hub_config(), HubConfig::default());
    }

    #[test]
    fn test_ping_period_is_derived_from_pong_wait() {
        let config = parse(&["--ws-pong-wait-secs", "30"]);
        let hub = config.hub_config();
        assert_eq!(hub.pong_wait, Duration::from_secs(30));
        assert_eq!(hub.ping_period, Duration::from_secs(27));
    }

    #[test]
    fn test_explicit_ping_period_wins() {
        let config = parse(&["--ws-pong-wait-secs", "30", "--ws-ping-period-secs", "10"]);
        assert_eq!(config.hub_config().ping_period, Duration::from_secs(10));
    }

    #[test]
    fn test_ping_period_not_below_pong_wait_fails_validation() {
        let config = parse(&["--ws-pong-wait-secs", "10", "--ws-ping-period-secs", "10"]);
        assert!(config.hub_config().validate().is_err());
    }

    #[test]
    fn test_allowed_origins_split_on_comma() {
        let config = parse(&["--allowed-origins", "https://a.example,https://b.example"]);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_rust_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse(), Ok(RustEnv::Production));
        assert_eq!("staging".parse(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
        assert!(parse(&["--runtime-env", "production"]).is_production());
    }
}
