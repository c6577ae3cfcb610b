//! Configuration management for the Stratum simulator
//!
//! Supports configuration via command line arguments, environment variables,
//! and an optional configuration file (YAML/JSON) with validation and defaults.

use crate::stratum::{JudgePolicy, NotifyMode, SessionContext};
use crate::types::{Extranonce1, WorkTemplate};
use crate::utils::LogFormat;
use crate::{Error, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Forced outcome for every share submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedResponse {
    /// Accept every share
    Accepted,
    /// Reject every share
    Rejected,
}

impl fmt::Display for ForcedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForcedResponse::Accepted => write!(f, "accepted"),
            ForcedResponse::Rejected => write!(f, "rejected"),
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Complete configuration for the simulator
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "fake-stratum",
    version = env!("CARGO_PKG_VERSION"),
    about = "Fake Stratum pool for testing mining clients",
    long_about = "Serves one static block template over Stratum v1, announces a configurable \
                  difficulty and answers share submissions with synthetic Accepted/Rejected results"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "FAKE_STRATUM_HOST", default_value = "0.0.0.0")]
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[arg(short = 'p', long, env = "FAKE_STRATUM_PORT", default_value = "3333")]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between re-sending the same block template
    #[arg(long, value_name = "SECONDS", default_value = "30")]
    #[serde(default = "default_notify_interval")]
    pub notify_interval: u64,

    /// Pool difficulty in (0, 1] for mining.set_difficulty
    #[arg(short = 'd', long, default_value = "1.0", allow_negative_numbers = true)]
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,

    /// Accept only when the submitted nonce (hex) equals this value
    #[arg(long, value_name = "N")]
    pub accept_nonce: Option<u32>,

    /// Send mining.notify only after each share submit (no timer)
    #[arg(long)]
    #[serde(default)]
    pub notify_on_share_only: bool,

    /// Force all share submits to be accepted or rejected
    #[arg(long, value_enum)]
    pub response: Option<ForcedResponse>,

    /// Extranonce1 handed out on mining.subscribe (4 bytes hex)
    #[arg(long, value_name = "HEX", default_value = "deadbeef")]
    #[serde(default)]
    pub extranonce1: Extranonce1,

    /// Block template file (YAML or JSON); defaults to the genesis block
    #[arg(long, value_name = "FILE")]
    pub template_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, default_value = "text")]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Config {
    /// Parse the command line and merge the config file if one is given
    pub async fn load() -> Result<Self> {
        let matches = Self::command().get_matches();
        let mut config = Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config, &matches);
        }

        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config.
    ///
    /// Values given on the command line or through the environment take
    /// precedence. Every other field takes the file's value.
    fn merge_with_file(mut self, file_config: Self, matches: &ArgMatches) -> Self {
        let from_file = |id: &str| {
            !matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        if from_file("host") {
            self.host = file_config.host;
        }
        if from_file("port") {
            self.port = file_config.port;
        }
        if from_file("notify_interval") {
            self.notify_interval = file_config.notify_interval;
        }
        if from_file("difficulty") {
            self.difficulty = file_config.difficulty;
        }
        if from_file("accept_nonce") {
            self.accept_nonce = file_config.accept_nonce;
        }
        if from_file("notify_on_share_only") {
            self.notify_on_share_only = file_config.notify_on_share_only;
        }
        if from_file("response") {
            self.response = file_config.response;
        }
        if from_file("extranonce1") {
            self.extranonce1 = file_config.extranonce1;
        }
        if from_file("template_file") {
            self.template_file = file_config.template_file;
        }
        if from_file("log_level") {
            self.log_level = file_config.log_level;
        }
        if from_file("log_format") {
            self.log_format = file_config.log_format;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.difficulty > 0.0 && self.difficulty <= 1.0) {
            return Err(Error::config("difficulty must be in (0, 1]"));
        }

        if !self.notify_on_share_only && self.notify_interval == 0 {
            return Err(Error::config("notify interval must be at least 1 second"));
        }

        if self.host.parse::<IpAddr>().is_err() {
            return Err(Error::config(format!("Invalid bind address: {}", self.host)));
        }

        Ok(())
    }

    /// Get listen socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| Error::config(format!("Invalid bind address: {}", e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Get the notify mode
    pub fn notify_mode(&self) -> NotifyMode {
        if self.notify_on_share_only {
            NotifyMode::OnShare
        } else {
            NotifyMode::Interval(Duration::from_secs(self.notify_interval))
        }
    }

    /// Get the submission judge policy
    pub fn judge_policy(&self) -> JudgePolicy {
        JudgePolicy::from_settings(self.response, self.accept_nonce)
    }

    /// Human-readable mode description for the startup log
    pub fn mode_description(&self) -> String {
        match self.notify_mode() {
            NotifyMode::OnShare => "notify_on_share_only".to_string(),
            NotifyMode::Interval(d) => format!("notify_interval={}s", d.as_secs()),
        }
    }

    /// Build the read-only context shared by every session
    pub async fn session_context(&self) -> Result<SessionContext> {
        let template = match &self.template_file {
            Some(path) => WorkTemplate::load(path).await?,
            None => WorkTemplate::genesis(),
        };

        Ok(SessionContext {
            difficulty: self.difficulty,
            notify_mode: self.notify_mode(),
            extranonce1: self.extranonce1.clone(),
            template: Arc::new(template),
            judge: Arc::new(self.judge_policy()),
        })
    }
}

// Default value functions for serde
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3333 }
fn default_notify_interval() -> u64 { 30 }
fn default_difficulty() -> f64 { 1.0 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Text }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["fake-stratum"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    fn parse_matches(args: &[&str]) -> (Config, ArgMatches) {
        let mut argv = vec!["fake-stratum"];
        argv.extend_from_slice(args);
        let matches = Config::command().try_get_matches_from(argv).unwrap();
        (Config::from_arg_matches(&matches).unwrap(), matches)
    }

    #[test]
    fn test_config_defaults() {
        let config = parse(&[]);

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3333);
        assert_eq!(config.notify_interval, 30);
        assert_eq!(config.difficulty, 1.0);
        assert_eq!(config.accept_nonce, None);
        assert!(!config.notify_on_share_only);
        assert_eq!(config.response, None);
        assert_eq!(config.extranonce1.as_str(), "deadbeef");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_difficulty_range() {
        assert!(parse(&["--difficulty", "0.5"]).validate().is_ok());
        assert!(parse(&["--difficulty", "1"]).validate().is_ok());

        for bad in ["0", "-0.5", "1.5", "NaN"] {
            let config = parse(&["--difficulty", bad]);
            assert!(
                matches!(config.validate(), Err(Error::Config { .. })),
                "difficulty {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_zero_interval_only_matters_in_timer_mode() {
        assert!(parse(&["--notify-interval", "0"]).validate().is_err());
        assert!(parse(&["--notify-interval", "0", "--notify-on-share-only"])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_host() {
        assert!(parse(&["--host", "not-an-ip"]).validate().is_err());
    }

    #[test]
    fn test_invalid_extranonce1() {
        assert!(Config::try_parse_from(["fake-stratum", "--extranonce1", "xyz"]).is_err());
    }

    #[test]
    fn test_notify_mode() {
        assert_eq!(
            parse(&["--notify-interval", "10"]).notify_mode(),
            NotifyMode::Interval(Duration::from_secs(10))
        );
        assert_eq!(
            parse(&["--notify-on-share-only"]).notify_mode(),
            NotifyMode::OnShare
        );
        assert_eq!(
            parse(&["--notify-on-share-only"]).mode_description(),
            "notify_on_share_only"
        );
    }

    #[test]
    fn test_judge_policy_selection() {
        assert_eq!(
            parse(&["--response", "accepted", "--accept-nonce", "7"]).judge_policy(),
            JudgePolicy::Forced(true)
        );
        assert_eq!(
            parse(&["--accept-nonce", "7"]).judge_policy(),
            JudgePolicy::TargetNonce(7)
        );
        assert_eq!(parse(&[]).judge_policy(), JudgePolicy::CoinFlip);
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = r#"
port: 4444
difficulty: 0.25
accept_nonce: 0
response: rejected
notify_on_share_only: true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let file_config = Config::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(file_config.port, 4444);
        assert_eq!(file_config.difficulty, 0.25);
        assert_eq!(file_config.host, "0.0.0.0");

        let (cli, matches) = parse_matches(&["--response", "accepted"]);
        let merged = cli.merge_with_file(file_config, &matches);
        assert_eq!(merged.response, Some(ForcedResponse::Accepted));
        assert_eq!(merged.accept_nonce, Some(0));
        assert!(merged.notify_on_share_only);
        assert_eq!(merged.port, 4444);
        assert_eq!(merged.difficulty, 0.25);
    }

    #[tokio::test]
    async fn test_cli_values_beat_file_values() {
        let yaml_content = r#"
host: 127.0.0.1
port: 4444
notify_interval: 5
difficulty: 0.25
extranonce1: CAFEBABE
log_level: debug
log_format: json
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();
        let file_config = Config::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();

        let (cli, matches) = parse_matches(&["--port", "5555", "--difficulty", "1.0"]);
        let merged = cli.merge_with_file(file_config, &matches);

        assert_eq!(merged.port, 5555);
        assert_eq!(merged.difficulty, 1.0);
        assert_eq!(merged.host, "127.0.0.1");
        assert_eq!(merged.notify_interval, 5);
        assert_eq!(merged.extranonce1.as_str(), "cafebabe");
        assert_eq!(merged.log_level, LogLevel::Debug);
        assert_eq!(merged.log_format, LogFormat::Json);
        assert!(merged.validate().is_ok());
    }

    #[tokio::test]
    async fn test_session_context() {
        let ctx = parse(&["--difficulty", "0.5", "--notify-on-share-only"])
            .session_context()
            .await
            .unwrap();

        assert_eq!(ctx.difficulty, 0.5);
        assert_eq!(ctx.notify_mode, NotifyMode::OnShare);
        assert_eq!(*ctx.template, WorkTemplate::genesis());
    }
}
