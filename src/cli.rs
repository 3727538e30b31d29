//! Configuration for the tickwire load driver.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tickwire::TransportConfig;

/// Command-line arguments for the load driver
#[derive(Parser, Debug)]
#[command(name = "tickwire")]
#[command(version)]
#[command(about = "Load driver for the tickwire TCP transport", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub mode: ModeArgs,
}

#[derive(Subcommand, Debug)]
pub enum ModeArgs {
    /// Run an echo server
    Server(ServerArgs),
    /// Run a swarm of clients against a server
    Client(ClientArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Event polls per second
    #[arg(short, long)]
    pub frequency: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of simultaneous clients
    #[arg(short = 'n', long)]
    pub clients: Option<usize>,

    /// Payload size in bytes
    #[arg(short = 's', long)]
    pub message_size: Option<usize>,

    /// Messages sent by each client per tick
    #[arg(short = 'm', long)]
    pub messages_per_tick: Option<usize>,

    /// Ticks per second
    #[arg(short, long)]
    pub frequency: Option<u32>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Echo server settings
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_server_frequency")]
    pub frequency: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            frequency: default_server_frequency(),
        }
    }
}

/// Client swarm settings
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_clients")]
    pub clients: usize,
    #[serde(default = "default_message_size")]
    pub message_size: usize,
    #[serde(default = "default_messages_per_tick")]
    pub messages_per_tick: usize,
    #[serde(default = "default_client_frequency")]
    pub frequency: u32,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            clients: default_clients(),
            message_size: default_message_size(),
            messages_per_tick: default_messages_per_tick(),
            frequency: default_client_frequency(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    1337
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_frequency() -> u32 {
    60
}

fn default_client_frequency() -> u32 {
    60
}

fn default_clients() -> usize {
    100
}

fn default_message_size() -> usize {
    16
}

fn default_messages_per_tick() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved echo server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub frequency: u32,
}

/// Resolved client swarm settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub clients: usize,
    pub message_size: usize,
    pub messages_per_tick: usize,
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server(ServerSettings),
    Client(ClientSettings),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub transport: TransportConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let mode = match cli.mode {
            ModeArgs::Server(args) => Mode::Server(ServerSettings {
                port: args.port.unwrap_or(toml_config.server.port),
                frequency: args.frequency.unwrap_or(toml_config.server.frequency),
            }),
            ModeArgs::Client(args) => {
                let file = toml_config.client;
                Mode::Client(ClientSettings {
                    host: args.host.unwrap_or(file.host),
                    port: args.port.unwrap_or(file.port),
                    clients: args.clients.unwrap_or(file.clients),
                    message_size: args.message_size.unwrap_or(file.message_size),
                    messages_per_tick: args.messages_per_tick.unwrap_or(file.messages_per_tick),
                    frequency: args.frequency.unwrap_or(file.frequency),
                })
            }
        };

        Config {
            mode,
            transport: toml_config.transport,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 1337);
        assert_eq!(config.server.frequency, 60);
        assert_eq!(config.client.host, "127.0.0.1");
        assert_eq!(config.client.clients, 100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.transport.queue_warning_threshold, 100_000);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            port = 7777

            [client]
            host = "10.0.0.5"
            clients = 500
            message_size = 64

            [transport]
            max_connections = 1000
            no_delay = false

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 7777);
        assert_eq!(config.server.frequency, 60);
        assert_eq!(config.client.host, "10.0.0.5");
        assert_eq!(config.client.clients, 500);
        assert_eq!(config.client.message_size, 64);
        assert_eq!(config.client.port, 1337);
        assert_eq!(config.transport.max_connections, 1000);
        assert!(!config.transport.no_delay);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [client]
            port = 9000
            clients = 5
            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let cli = parse(&["tickwire", "client", "--clients", "7", "--log-level", "trace"]);
        let config = Config::merge(cli, toml_config);

        let Mode::Client(client) = config.mode else {
            panic!("expected client mode");
        };
        assert_eq!(client.clients, 7);
        assert_eq!(client.port, 9000);
        assert_eq!(client.message_size, 16);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_server_mode() {
        let cli = parse(&["tickwire", "server", "--port", "4000"]);
        let config = Config::merge(cli, TomlConfig::default());
        assert_eq!(
            config.mode,
            Mode::Server(ServerSettings {
                port: 4000,
                frequency: 60,
            })
        );
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["tickwire", "--config", "/nonexistent/tickwire.toml", "server"]);
        assert!(matches!(
            Config::from_args(cli),
            Err(ConfigError::FileRead(_, _))
        ));
    }

    #[test]
    fn test_config_error_message() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ConfigError::FileRead(PathBuf::from("/etc/tickwire.toml"), missing);
        assert_eq!(
            err.to_string(),
            "Failed to read config file '/etc/tickwire.toml': no such file"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
