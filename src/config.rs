use std::{
    collections::BTreeMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use crate::error::AppError;
use crate::storage::MySqlSettings;

#[derive(Parser, Debug)]
#[command(name = "spendlog", about = "spendlog - record daily expenses and see where the money goes")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "spendlog.toml")]
    pub config: String,

    /// Storage backend (overrides config file)
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the REST API
    Serve {
        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the expenses recorded for a day
    Show { date: String },
    /// Edit a day's expenses in an interactive form
    Edit { date: String },
    /// Replace every expense of a day
    Set {
        date: String,
        #[arg(short, long = "entry", value_name = "AMOUNT:CATEGORY[:NOTES]")]
        entries: Vec<String>,
    },
    /// Spending per category over a date range
    Analytics {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Query a running spendlog API instead of the local store
        #[arg(long, value_name = "URL")]
        api: Option<String>,
    },
    /// Copy every expense from one backend to another
    Migrate {
        #[arg(long, value_enum)]
        from: BackendKind,
        #[arg(long, value_enum)]
        to: BackendKind,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Mysql,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Defaults to `~/.expense_manager/expenses.db`
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,

    /// TOML file holding `DB_HOST`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_PORT`
    #[serde(default = "default_secrets_file")]
    pub secrets_file: PathBuf,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    /// Serves `/metrics` in Prometheus text format.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_secrets_file() -> PathBuf {
    PathBuf::from(".spendlog").join("secrets.toml")
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

pub fn default_sqlite_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".expense_manager")
        .join("expenses.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: BackendKind::default(),
            sqlite_path: None,
            secrets_file: default_secrets_file(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            database: DatabaseConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(backend) = cli.backend {
            config.database.backend = backend;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }

        config
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid listen address: {}", e)))
    }
}

impl DatabaseConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path.clone().unwrap_or_else(default_sqlite_path)
    }

    /// Resolves MySQL connection settings key by key from `sources`, first hit
    /// wins, falling back to the built-in defaults.
    pub fn mysql_settings(&self, sources: &[&dyn SettingSource]) -> MySqlSettings {
        let defaults = MySqlSettings::default();
        let port = match lookup(sources, "DB_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "DB_PORT is not a port number, using {}", defaults.port);
                defaults.port
            }),
            None => defaults.port,
        };

        MySqlSettings {
            host: lookup(sources, "DB_HOST").unwrap_or(defaults.host),
            user: lookup(sources, "DB_USER").unwrap_or(defaults.user),
            password: lookup(sources, "DB_PASSWORD").unwrap_or(defaults.password),
            database: lookup(sources, "DB_NAME").unwrap_or(defaults.database),
            port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// One layer of connection settings.
pub trait SettingSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub fn lookup(sources: &[&dyn SettingSource], key: &str) -> Option<String> {
    sources.iter().find_map(|source| source.get(key))
}

impl SettingSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// The process environment.
pub struct Environment;

impl SettingSource for Environment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A flat TOML secrets file. A missing file is an empty source.
#[derive(Debug, Default)]
pub struct SecretsFile {
    values: BTreeMap<String, String>,
}

impl SecretsFile {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable secrets file");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(contents)?;
        let values = table
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Ok(Self { values })
    }
}

impl SettingSource for SecretsFile {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
