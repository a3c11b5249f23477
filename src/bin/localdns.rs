use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use getopts::{Matches, Options};

use localdns::dns::context::{ServerContext, Settings};
use localdns::dns::logging::{LogLevel, StructuredLogger};
use localdns::privilege_escalation::warn_missing_privileges;
use localdns::web::server::WebServer;

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn build_options() -> Options {
    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu");
    opts.optopt("c", "config", "TOML settings file", "FILE");
    opts.optopt("b", "bind", "Address for the web interface (default 0.0.0.0)", "ADDR");
    opts.optopt("p", "port", "Port for the web interface (default 5000)", "PORT");
    opts.optopt("d", "domain", "Local domain (default home.local)", "DOMAIN");
    opts.optopt("", "records-file", "The record list", "PATH");
    opts.optopt("", "forward-zone", "Forward zone file to generate", "PATH");
    opts.optopt("", "reverse-zone", "Reverse zone file to generate", "PATH");
    opts.optopt("", "log-level", "trace, debug, info, warn or error", "LEVEL");
    opts.optflag("", "json-logs", "Emit logs as JSON");
    opts
}

/// Command-line values win over the settings file.
fn apply_overrides(settings: &mut Settings, matches: &Matches) -> Result<(), String> {
    if let Some(addr) = matches.opt_str("bind") {
        settings.listen_addr = addr;
    }
    if let Some(port) = matches.opt_str("port") {
        settings.listen_port = port
            .parse()
            .map_err(|_| format!("Invalid port: {}", port))?;
    }
    if let Some(domain) = matches.opt_str("domain") {
        settings.domain = domain;
    }
    if let Some(path) = matches.opt_str("records-file") {
        settings.records_file = PathBuf::from(path);
    }
    if let Some(path) = matches.opt_str("forward-zone") {
        settings.forward_zone_file = PathBuf::from(path);
    }
    if let Some(path) = matches.opt_str("reverse-zone") {
        settings.reverse_zone_file = PathBuf::from(path);
    }
    if let Some(level) = matches.opt_str("log-level") {
        settings.logging.level = level.parse::<LogLevel>()?;
    }
    if matches.opt_present("json-logs") {
        settings.logging.json = true;
    }

    settings.validate().map_err(|e| e.to_string())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();
    let opts = build_options();

    let opt_matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            print_usage(&program, opts);
            process::exit(2);
        }
    };

    if opt_matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }

    let config_path = opt_matches.opt_str("config");
    let mut settings = match Settings::load(config_path.as_deref().map(Path::new)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    if let Err(e) = apply_overrides(&mut settings, &opt_matches) {
        eprintln!("{}", e);
        process::exit(2);
    }

    match StructuredLogger::init(settings.logger_config()) {
        Ok(logger) => log::info!(
            "localdns {} starting at log level {:?}",
            env!("CARGO_PKG_VERSION"),
            logger.config().level
        ),
        Err(e) => eprintln!("Failed to initialize logging: {}", e),
    }
    warn_missing_privileges(settings.listen_port, &settings.reload_command);

    let context = match ServerContext::from_settings(settings) {
        Ok(context) => context,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = context.initialize() {
        log::error!("Failed to prepare record and zone files: {}", e);
        process::exit(1);
    }

    let webserver = WebServer::new(Arc::new(context));
    if let Err(e) = webserver.run_webserver() {
        log::error!("Failed to start HTTP web server: {}", e);
        process::exit(1);
    }
}
