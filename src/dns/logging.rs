//! Structured Logging Module
//!
//! Installs the process-wide `tracing` subscriber and provides structured
//! events for the operations worth auditing: record mutations, diagnostic
//! lookups and web requests.
//!
//! Library code elsewhere logs through the `log` facade; those records reach
//! the same subscriber through the `tracing-log` bridge.
//!
//! # Features
//!
//! * **Correlation IDs** - Tie the events of one mutation together
//! * **JSON or pretty output** - Chosen per deployment
//! * **Env override** - `RUST_LOG` wins over the configured level

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::{info, warn, error, Level};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Log levels accepted in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum log level to output
    pub level: LogLevel,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable console output
    pub console_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            console_output: true,
        }
    }
}

/// Correlation ID context for request tracking
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub id: String,
    pub created_at: SystemTime,
    pub component: String,
    pub operation: String,
}

impl CorrelationContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: SystemTime::now(),
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }
}

/// Outcome of a record mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationLog {
    /// `upsert`, `delete` or `regenerate`
    pub operation: String,
    pub host: Option<String>,
    pub address: Option<String>,
    pub record_count: usize,
    pub serial: Option<u32>,
    pub reload_ok: Option<bool>,
    pub error: Option<String>,
}

/// Diagnostic lookup details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupLog {
    pub target: String,
    pub output_bytes: usize,
    pub error: Option<String>,
}

/// HTTP request logging details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestLog {
    pub method: String,
    pub path: String,
    pub status_code: u16,
}

/// Structured logger implementation
pub struct StructuredLogger {
    config: LoggerConfig,
}

impl StructuredLogger {
    /// Initialize the global subscriber. A subscriber that is already
    /// installed (e.g. by another test) is left in place.
    pub fn init(config: LoggerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(format!("{:?}", config.level).to_lowercase()))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let init_result = if config.console_output && config.json_format {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .try_init()
        } else if config.console_output {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("off"))
                .try_init()
        };

        if let Err(e) = init_result {
            if config.console_output {
                eprintln!("Warning: Tracing subscriber already initialized: {}", e);
            }
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }
}

/// Log the result of a record mutation
pub fn log_mutation(ctx: &CorrelationContext, entry: &MutationLog) {
    let duration_ms = ctx.elapsed().as_millis() as u64;
    let host = entry.host.as_deref().unwrap_or("-");
    let address = entry.address.as_deref().unwrap_or("-");

    if let Some(ref err) = entry.error {
        error!(
            correlation_id = %ctx.id,
            component = %ctx.component,
            operation = %entry.operation,
            host = %host,
            address = %address,
            duration_ms = duration_ms,
            "Record {} failed: {}", entry.operation, err
        );
        return;
    }

    match entry.reload_ok {
        Some(false) => warn!(
            correlation_id = %ctx.id,
            component = %ctx.component,
            operation = %entry.operation,
            host = %host,
            address = %address,
            record_count = entry.record_count,
            serial = ?entry.serial,
            duration_ms = duration_ms,
            "Record {} committed but name server reload failed", entry.operation
        ),
        _ => info!(
            correlation_id = %ctx.id,
            component = %ctx.component,
            operation = %entry.operation,
            host = %host,
            address = %address,
            record_count = entry.record_count,
            serial = ?entry.serial,
            duration_ms = duration_ms,
            "Record {} committed", entry.operation
        ),
    }
}

/// Log a diagnostic lookup
pub fn log_lookup(ctx: &CorrelationContext, entry: &LookupLog) {
    match entry.error {
        Some(ref err) => warn!(
            correlation_id = %ctx.id,
            target = %entry.target,
            "Lookup of {} failed: {}", entry.target, err
        ),
        None => info!(
            correlation_id = %ctx.id,
            target = %entry.target,
            output_bytes = entry.output_bytes,
            duration_ms = ctx.elapsed().as_millis() as u64,
            "Lookup of {}", entry.target
        ),
    }
}

/// Log an HTTP request event
pub fn log_http_request(ctx: &CorrelationContext, request_log: &HttpRequestLog) {
    info!(
        correlation_id = %ctx.id,
        component = %ctx.component,
        method = %request_log.method,
        path = %request_log.path,
        status_code = request_log.status_code,
        duration_ms = ctx.elapsed().as_millis() as u64,
        "{} {} -> {}", request_log.method, request_log.path, request_log.status_code
    );
}
