//! localdns CLI Tool
//!
//! Edits the record list and regenerates the zone files on the local machine,
//! without going through the web interface.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use comfy_table::Table;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;

use localdns::dns::authority::{MutationOutcome, ReloadStatus, SyncReport};
use localdns::dns::context::{ServerContext, Settings};
use localdns::dns::logging::{LogLevel, LoggerConfig, StructuredLogger};

/// Manage the local BIND9 host records from the command line
#[derive(Parser)]
#[command(name = "localdns-cli")]
#[command(version, about = "localdns command line interface", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML settings file shared with the web server
    #[arg(short = 'c', long, env = "LOCALDNS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the record list path
    #[arg(long, env = "LOCALDNS_RECORDS_FILE")]
    records_file: Option<PathBuf>,

    /// Override the forward zone file path
    #[arg(long, env = "LOCALDNS_FORWARD_ZONE")]
    forward_zone: Option<PathBuf>,

    /// Override the reverse zone file path
    #[arg(long, env = "LOCALDNS_REVERSE_ZONE")]
    reverse_zone: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// No color output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Table,
    Json,
    Plain,
}

#[derive(Subcommand)]
enum Commands {
    /// List the current records
    List,

    /// Add a host or point it at a new address
    Add {
        /// Host name without the domain
        name: String,
        /// IPv4 address
        ip: String,
    },

    /// Remove a host
    Remove {
        /// Host name without the domain
        name: String,
    },

    /// Rewrite both zone files from the record list and reload
    Regenerate,

    /// Query the local name server for a hostname or address
    Lookup {
        target: String,
    },

    /// Compare the zone files on disk with the record list
    Check,
}

struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    fn print_records(&self, domain: &str, rows: &[Value]) {
        match self.format {
            OutputFormat::Json => self.print_json(&json!(rows)),
            OutputFormat::Plain => {
                for row in rows {
                    println!("{} {}", value_to_string(&row["name"]), value_to_string(&row["ip"]));
                }
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table.set_header(vec!["Name", "FQDN", "IP"]);
                for row in rows {
                    table.add_row(vec![
                        value_to_string(&row["name"]),
                        format!("{}.{}", value_to_string(&row["name"]), domain),
                        value_to_string(&row["ip"]),
                    ]);
                }
                println!("{}", table);
            }
        }
    }

    fn print_json(&self, data: &Value) {
        match serde_json::to_string_pretty(data) {
            Ok(text) => println!("{}", text),
            Err(e) => self.print_error(&format!("Failed to encode output: {}", e)),
        }
    }

    fn print_outcome(&self, action: &str, outcome: &MutationOutcome) {
        if let OutputFormat::Json = self.format {
            self.print_json(&json!({
                "record_count": outcome.records.len(),
                "serial": outcome.documents.serial,
                "reload": outcome.reload,
            }));
            return;
        }

        self.print_success(&format!(
            "{} ({} records, serial {})",
            action,
            outcome.records.len(),
            outcome.documents.serial
        ));
        if let ReloadStatus::Failed(message) = &outcome.reload {
            self.print_warning(&format!("Name server reload failed: {}", message));
        }
    }

    fn print_report(&self, report: &SyncReport) {
        if let OutputFormat::Json = self.format {
            self.print_json(&json!(report));
            return;
        }

        let mut table = Table::new();
        table.set_header(vec!["Check", "Result"]);
        table.add_row(vec!["Skipped lines".to_string(), report.skipped_lines.to_string()]);
        table.add_row(vec!["Forward serial".to_string(), serial_text(report.forward_serial)]);
        table.add_row(vec!["Reverse serial".to_string(), serial_text(report.reverse_serial)]);
        for (label, items) in [
            ("Missing A", &report.missing_forward),
            ("Unexpected A", &report.unexpected_forward),
            ("Missing PTR", &report.missing_reverse),
            ("Unexpected PTR", &report.unexpected_reverse),
        ] {
            if !items.is_empty() {
                table.add_row(vec![label.to_string(), items.join("\n")]);
            }
        }
        println!("{}", table);

        if report.is_in_sync() {
            self.print_success("Zone files match the record list");
        } else {
            self.print_warning("Zone files are out of date; run `localdns-cli regenerate`");
        }
    }

    fn print_success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    fn print_error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    fn print_warning(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

fn serial_text(serial: Option<u32>) -> String {
    serial.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(path) = &cli.records_file {
        settings.records_file = path.clone();
    }
    if let Some(path) = &cli.forward_zone {
        settings.forward_zone_file = path.clone();
    }
    if let Some(path) = &cli.reverse_zone {
        settings.reverse_zone_file = path.clone();
    }
    Ok(settings)
}

fn run(cli: Cli, formatter: &OutputFormatter) -> Result<bool, Box<dyn std::error::Error>> {
    let settings = load_settings(&cli)?;
    let domain = settings.domain.clone();
    let context = ServerContext::from_settings(settings)?;

    match cli.command {
        Commands::List => {
            let records = context.authority.records()?;
            let rows: Vec<Value> = records
                .iter()
                .map(|r| json!({ "name": r.name, "ip": r.address.to_string() }))
                .collect();
            formatter.print_records(&domain, &rows);
        }
        Commands::Add { name, ip } => {
            let outcome = context.authority.upsert(&name, &ip)?;
            formatter.print_outcome(&format!("Saved {}.{}", name.trim(), domain), &outcome);
        }
        Commands::Remove { name } => {
            let outcome = context.authority.delete_record(&name)?;
            formatter.print_outcome(&format!("Removed {}.{}", name.trim(), domain), &outcome);
        }
        Commands::Regenerate => {
            let outcome = context.authority.regenerate()?;
            formatter.print_outcome("Regenerated zone files", &outcome);
        }
        Commands::Lookup { target } => {
            let output = context.lookup(&target)?;
            match formatter.format {
                OutputFormat::Json => formatter.print_json(&json!({ "target": target.trim(), "output": output })),
                _ => print!("{}", output),
            }
        }
        Commands::Check => {
            let report = context.authority.check()?;
            formatter.print_report(&report);
            return Ok(report.is_in_sync());
        }
    }

    Ok(true)
}

fn main() {
    let cli = Cli::parse();
    let formatter = OutputFormatter::new(cli.output, cli.no_color);

    let logger = LoggerConfig {
        level: if cli.verbose { LogLevel::Debug } else { LogLevel::Warn },
        ..LoggerConfig::default()
    };
    if let Err(e) = StructuredLogger::init(logger) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli, &formatter) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            formatter.print_error(&e.to_string());
            process::exit(1);
        }
    }
}
