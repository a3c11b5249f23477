//! Diagnostic lookups through an external query tool
//!
//! The tool's combined stdout and stderr is handed back verbatim. A non-zero
//! exit (e.g. `nslookup` reporting NXDOMAIN) is still a successful lookup;
//! only a failure to run the tool at all is an error.

use std::fmt;
use std::time::Duration;

use crate::dns::process::{self, ExecutionError};
use crate::dns::validation::{validate_lookup_target, ValidationError};

#[derive(Debug)]
pub enum LookupError {
    Validation(ValidationError),
    Execution(ExecutionError),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Validation(e) => write!(f, "{}", e),
            LookupError::Execution(e) => write!(f, "Lookup failed: {}", e),
        }
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LookupError::Validation(e) => Some(e),
            LookupError::Execution(e) => Some(e),
        }
    }
}

impl From<ValidationError> for LookupError {
    fn from(err: ValidationError) -> Self {
        LookupError::Validation(err)
    }
}

impl From<ExecutionError> for LookupError {
    fn from(err: ExecutionError) -> Self {
        LookupError::Execution(err)
    }
}

/// Capability to run a diagnostic query for a hostname or address
pub trait LookupRunner: Send + Sync {
    fn lookup(&self, target: &str) -> Result<String, LookupError>;
}

/// `nslookup <target> <resolver>`
#[derive(Clone, Debug)]
pub struct NslookupRunner {
    pub program: String,
    pub resolver: String,
    pub timeout: Duration,
}

impl NslookupRunner {
    pub fn new(program: &str, resolver: &str, timeout: Duration) -> NslookupRunner {
        NslookupRunner {
            program: program.to_string(),
            resolver: resolver.to_string(),
            timeout,
        }
    }
}

impl LookupRunner for NslookupRunner {
    fn lookup(&self, target: &str) -> Result<String, LookupError> {
        let target = validate_lookup_target(target)?;
        let args = vec![target, self.resolver.clone()];

        let output = process::output_with_timeout(&self.program, &args, self.timeout)?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_target_rejected() {
        let runner = NslookupRunner::new("nslookup", "127.0.0.1", Duration::from_secs(1));
        assert!(matches!(
            runner.lookup("   "),
            Err(LookupError::Validation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_passed_through_verbatim() {
        // `echo` stands in for the query tool: it prints its arguments
        let runner = NslookupRunner::new("echo", "127.0.0.1", Duration::from_secs(5));
        let output = runner.lookup(" pc1.home.local ").unwrap();
        assert_eq!(output, "pc1.home.local 127.0.0.1\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_still_returns_output() {
        let runner = NslookupRunner::new("false", "127.0.0.1", Duration::from_secs(5));
        assert_eq!(runner.lookup("pc1").unwrap(), "");
    }

    #[test]
    fn test_missing_tool() {
        let runner = NslookupRunner::new("/nonexistent/nslookup", "127.0.0.1", Duration::from_secs(5));
        assert!(matches!(
            runner.lookup("pc1"),
            Err(LookupError::Execution(ExecutionError::ExecutionStart { .. }))
        ));
    }
}
