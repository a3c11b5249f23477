//! Input validation for host mappings and lookup targets
//!
//! Applied at the edge of every mutation so that nothing the zone generator
//! cannot express ever reaches the record store.

use regex::Regex;
use std::net::Ipv4Addr;
use lazy_static::lazy_static;

lazy_static! {
    /// Valid DNS label pattern (RFC 1035)
    static ref DNS_LABEL_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?$").expect("Failed to compile DNS label regex");
}

const MAX_DNS_LABEL_LENGTH: usize = 63;
const MAX_LOOKUP_TARGET_LENGTH: usize = 253;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(&'static str),
    InvalidHostLabel(String),
    InvalidIpAddress(String),
    InvalidLookupTarget(String),
    LengthViolation { field: String, max: usize, actual: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "Field '{}' must not be empty", field),
            ValidationError::InvalidHostLabel(label) => {
                write!(f, "Invalid host name '{}': use a single label without the domain", label)
            }
            ValidationError::InvalidIpAddress(ip) => write!(f, "Invalid IPv4 address: {}", ip),
            ValidationError::InvalidLookupTarget(target) => write!(f, "Invalid lookup target: {}", target),
            ValidationError::LengthViolation { field, max, actual } => {
                write!(f, "Field '{}' is {} characters long, maximum is {}", field, actual, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a short host name (one DNS label, no domain suffix)
pub fn validate_host_label(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }

    if name.len() > MAX_DNS_LABEL_LENGTH {
        return Err(ValidationError::LengthViolation {
            field: "name".to_string(),
            max: MAX_DNS_LABEL_LENGTH,
            actual: name.len(),
        });
    }

    if !DNS_LABEL_REGEX.is_match(name) {
        return Err(ValidationError::InvalidHostLabel(name.to_string()));
    }

    Ok(name.to_string())
}

/// Validate the name of a record that may already be stored. Hand-edited
/// stores can hold names that are not valid labels, so only emptiness is
/// rejected.
pub fn validate_record_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }

    Ok(name.to_string())
}

/// Validate a dotted-quad IPv4 address
pub fn validate_ipv4_address(ip: &str) -> Result<Ipv4Addr, ValidationError> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(ValidationError::EmptyField("ip"));
    }

    ip.parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::InvalidIpAddress(ip.to_string()))
}

/// Validate a hostname or address handed to the lookup tool. Anything
/// non-empty goes, except strings the tool would read as an option.
pub fn validate_lookup_target(target: &str) -> Result<String, ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::EmptyField("target"));
    }

    if target.len() > MAX_LOOKUP_TARGET_LENGTH {
        return Err(ValidationError::LengthViolation {
            field: "target".to_string(),
            max: MAX_LOOKUP_TARGET_LENGTH,
            actual: target.len(),
        });
    }

    if target.starts_with('-') || target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidLookupTarget(target.to_string()));
    }

    Ok(target.to_string())
}
