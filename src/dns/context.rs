//! The `ServerContext` holds the configuration and the capabilities shared by
//! every request: the authority over the record store and zone files, and the
//! diagnostic lookup runner.

use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, Error, From};
use serde_derive::{Deserialize, Serialize};

use crate::dns::authority::{Authority, AuthorityError};
use crate::dns::logging::{log_lookup, CorrelationContext, LogLevel, LoggerConfig, LookupLog};
use crate::dns::lookup::{LookupError, LookupRunner, NslookupRunner};
use crate::dns::record_store::RecordStore;
use crate::dns::reload::{CommandReloader, Reloader};
use crate::dns::validation::validate_host_label;
use crate::dns::zone_writer::{ReverseNetwork, SerialPolicy, ZoneConfig, ZoneWriter};

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Invalid { field: &'static str, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { field, message } => {
                write!(f, "Invalid setting '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Display, From, Error)]
pub enum ContextError {
    Authority(AuthorityError),
    Config(ConfigError),
}

type Result<T> = std::result::Result<T, ContextError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: LogLevel::Info,
            json: false,
        }
    }
}

/// Deployment settings, read from an optional TOML file. Every key may be
/// omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Address published for `ns1.<domain>`
    pub nameserver_ip: Ipv4Addr,
    pub domain: String,
    /// First three octets covered by the reverse zone
    pub reverse_network: String,
    pub forward_zone_file: PathBuf,
    pub reverse_zone_file: PathBuf,
    pub records_file: PathBuf,
    pub reload_command: Vec<String>,
    pub lookup_program: String,
    pub lookup_resolver: String,
    pub command_timeout_secs: u64,
    pub serial_policy: SerialPolicy,
    pub listen_addr: String,
    pub listen_port: u16,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            nameserver_ip: Ipv4Addr::new(192, 168, 0, 5),
            domain: "home.local".to_string(),
            reverse_network: "192.168.0".to_string(),
            forward_zone_file: PathBuf::from("/etc/bind/db.home.local"),
            reverse_zone_file: PathBuf::from("/etc/bind/db.192.168.0"),
            records_file: PathBuf::from("/etc/bind/webdns/records.txt"),
            reload_command: ["sudo", "systemctl", "reload", "bind9"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookup_program: "nslookup".to_string(),
            lookup_resolver: "127.0.0.1".to_string(),
            command_timeout_secs: 10,
            serial_policy: SerialPolicy::Hourly,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 5000,
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults when `path` is `None`, otherwise the file's values over the
    /// defaults.
    pub fn load(path: Option<&Path>) -> std::result::Result<Settings, ConfigError> {
        let settings = match path {
            None => Settings::default(),
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.domain.is_empty()
            || self
                .domain
                .split('.')
                .any(|label| validate_host_label(label).is_err())
        {
            return Err(ConfigError::Invalid {
                field: "domain",
                message: format!("'{}' is not a valid domain name", self.domain),
            });
        }

        self.reverse_network()?;

        if self.reload_command.is_empty() {
            return Err(ConfigError::Invalid {
                field: "reload_command",
                message: "must name at least the program to run".to_string(),
            });
        }

        if self.lookup_program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "lookup_program",
                message: "must not be empty".to_string(),
            });
        }

        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "command_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn reverse_network(&self) -> std::result::Result<ReverseNetwork, ConfigError> {
        self.reverse_network
            .parse()
            .map_err(|e: crate::dns::zone_writer::InvalidReverseNetwork| ConfigError::Invalid {
                field: "reverse_network",
                message: e.to_string(),
            })
    }

    pub fn zone_config(&self) -> std::result::Result<ZoneConfig, ConfigError> {
        Ok(ZoneConfig {
            domain: self.domain.clone(),
            nameserver: self.nameserver_ip,
            reverse_network: self.reverse_network()?,
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            level: self.logging.level,
            json_format: self.logging.json,
            ..LoggerConfig::default()
        }
    }
}

pub struct ServerContext {
    pub settings: Settings,
    pub authority: Authority,
    pub lookup_runner: Box<dyn LookupRunner>,
}

impl ServerContext {
    /// Context backed by the configured reload command and lookup tool
    pub fn from_settings(settings: Settings) -> Result<ServerContext> {
        let reloader = CommandReloader::new(settings.reload_command.clone(), settings.command_timeout());
        let lookup = NslookupRunner::new(
            &settings.lookup_program,
            &settings.lookup_resolver,
            settings.command_timeout(),
        );

        ServerContext::with_capabilities(settings, Box::new(reloader), Box::new(lookup))
    }

    pub fn with_capabilities(
        settings: Settings,
        reloader: Box<dyn Reloader>,
        lookup_runner: Box<dyn LookupRunner>,
    ) -> Result<ServerContext> {
        settings.validate()?;

        let zones = ZoneWriter::new(
            settings.zone_config()?,
            settings.forward_zone_file.clone(),
            settings.reverse_zone_file.clone(),
            settings.serial_policy,
        );
        let store = RecordStore::new(settings.records_file.clone());

        Ok(ServerContext {
            authority: Authority::new(store, zones, reloader),
            lookup_runner,
            settings,
        })
    }

    /// Create any missing files so the first request finds them.
    pub fn initialize(&self) -> Result<()> {
        self.authority.ensure_initialized()?;
        log::info!(
            "Serving {} and {} from {}",
            self.settings.domain,
            self.authority.zones().config.reverse_network.arpa_zone(),
            self.settings.records_file.display()
        );
        Ok(())
    }

    pub fn lookup(&self, target: &str) -> std::result::Result<String, LookupError> {
        let ctx = CorrelationContext::new("lookup", "nslookup");
        let result = self.lookup_runner.lookup(target);

        log_lookup(
            &ctx,
            &LookupLog {
                target: target.trim().to_string(),
                output_bytes: result.as_ref().map(|s| s.len()).unwrap_or(0),
                error: result.as_ref().err().map(|e| e.to_string()),
            },
        );

        result
    }
}
