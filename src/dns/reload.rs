//! Name server reload trigger
//!
//! After a mutation has been committed the running name server is asked to
//! re-read its zones. The request is best effort: failures are reported back
//! but never undo the committed files, and nothing is retried.

use std::time::Duration;

use crate::dns::process::{self, ExecutionError};
use crate::privilege_escalation::has_admin_privileges;

/// Capability to tell the name server that zone data changed
pub trait Reloader: Send + Sync {
    fn reload(&self) -> Result<(), ExecutionError>;
}

/// Runs a configured command such as `sudo systemctl reload bind9`
#[derive(Clone, Debug)]
pub struct CommandReloader {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandReloader {
    pub fn new(argv: Vec<String>, timeout: Duration) -> CommandReloader {
        CommandReloader { argv, timeout }
    }

    /// The command line actually executed. A leading `sudo` is dropped when
    /// the process is already privileged.
    pub fn effective_argv(&self) -> &[String] {
        strip_sudo(&self.argv, has_admin_privileges())
    }
}

fn strip_sudo(argv: &[String], privileged: bool) -> &[String] {
    match argv.split_first() {
        Some((first, rest)) if privileged && first == "sudo" && !rest.is_empty() => rest,
        _ => argv,
    }
}

impl Reloader for CommandReloader {
    fn reload(&self) -> Result<(), ExecutionError> {
        let argv = self.effective_argv();
        log::info!("Reloading name server: {}", argv.join(" "));
        process::execute(argv, self.timeout)?;
        Ok(())
    }
}
