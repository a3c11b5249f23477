//! Reader for the BIND-style zone files this crate writes
//!
//! Only the subset needed to read generated documents back is supported:
//! - `$TTL` and `$ORIGIN` directives
//! - `;` comments
//! - parenthesised multi-line records (the SOA block)
//! - owner inheritance for lines that start with whitespace
//! - optional TTL and `IN` class before the record type
//!
//! Record data is kept as raw tokens; callers interpret the types they care about.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

/// Parser errors with line number information
#[derive(Debug)]
pub enum ParseError {
    InvalidSyntax { line: usize, message: String },
    MissingField { line: usize, field: String },
    InvalidSoaSerial { line: usize, serial: String },
    InvalidTtl { line: usize, ttl: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidSyntax { line, message } =>
                write!(f, "Line {}: Invalid syntax: {}", line, message),
            ParseError::MissingField { line, field } =>
                write!(f, "Line {}: Missing required field: {}", line, field),
            ParseError::InvalidSoaSerial { line, serial } =>
                write!(f, "Line {}: Invalid SOA serial: {}", line, serial),
            ParseError::InvalidTtl { line, ttl } =>
                write!(f, "Line {}: Invalid TTL value: {}", line, ttl),
        }
    }
}

impl std::error::Error for ParseError {}

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneEntry {
    pub line: usize,
    pub owner: String,
    pub rtype: String,
    pub data: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedZone {
    pub origin: Option<String>,
    pub default_ttl: Option<u32>,
    pub serial: Option<u32>,
    pub entries: Vec<ZoneEntry>,
}

impl ParsedZone {
    /// `(owner, address)` for every A record, in file order
    pub fn a_records(&self) -> Vec<(String, Ipv4Addr)> {
        self.entries
            .iter()
            .filter(|e| e.rtype == "A")
            .filter_map(|e| {
                let addr = e.data.first()?.parse::<Ipv4Addr>().ok()?;
                Some((e.owner.clone(), addr))
            })
            .collect()
    }

    /// `(owner, target)` for every PTR record, in file order
    pub fn ptr_records(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|e| e.rtype == "PTR")
            .filter_map(|e| Some((e.owner.clone(), e.data.first()?.clone())))
            .collect()
    }
}

/// Zone file reader state
pub struct ZoneReader {
    line_number: usize,
    last_owner: Option<String>,
}

impl Default for ZoneReader {
    fn default() -> Self {
        ZoneReader::new()
    }
}

impl ZoneReader {
    pub fn new() -> Self {
        ZoneReader {
            line_number: 0,
            last_owner: None,
        }
    }

    pub fn parse_string(&mut self, content: &str) -> Result<ParsedZone> {
        let mut zone = ParsedZone::default();

        let mut multiline: Option<(usize, String)> = None;

        for (idx, raw) in content.lines().enumerate() {
            self.line_number = idx + 1;
            let line = strip_comment(raw);

            if let Some((start, mut buffer)) = multiline.take() {
                buffer.push(' ');
                buffer.push_str(line.trim());
                if line.contains(')') {
                    self.line_number = start;
                    self.parse_line(&mut zone, &buffer)?;
                } else {
                    multiline = Some((start, buffer));
                }
                continue;
            }

            if line.contains('(') && !line.contains(')') {
                multiline = Some((self.line_number, line.to_string()));
                continue;
            }

            self.parse_line(&mut zone, line)?;
        }

        if let Some((start, _)) = multiline {
            return Err(ParseError::InvalidSyntax {
                line: start,
                message: "Unclosed parentheses in multi-line record".to_string(),
            });
        }

        Ok(zone)
    }

    pub fn parse_file(&mut self, path: &Path) -> std::io::Result<Result<ParsedZone>> {
        let content = fs::read_to_string(path)?;
        Ok(self.parse_string(&content))
    }

    fn parse_line(&mut self, zone: &mut ParsedZone, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let inherits_owner = line.starts_with(char::is_whitespace);
        let cleaned = line.replace('(', " ").replace(')', " ");
        let parts: Vec<&str> = cleaned.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(());
        }

        if parts[0].starts_with('$') {
            return self.parse_directive(zone, &parts);
        }

        let mut idx = 0;
        let owner = if inherits_owner {
            self.last_owner.clone().ok_or_else(|| ParseError::MissingField {
                line: self.line_number,
                field: "owner name".to_string(),
            })?
        } else {
            idx += 1;
            parts[0].to_string()
        };
        self.last_owner = Some(owner.clone());

        // optional TTL and class, in either order
        for _ in 0..2 {
            match parts.get(idx) {
                Some(p) if p.eq_ignore_ascii_case("IN") => idx += 1,
                Some(p) if p.chars().all(|c| c.is_ascii_digit()) => idx += 1,
                _ => {}
            }
        }

        let rtype = parts
            .get(idx)
            .ok_or_else(|| ParseError::MissingField {
                line: self.line_number,
                field: "record type".to_string(),
            })?
            .to_uppercase();
        let data: Vec<String> = parts[idx + 1..].iter().map(|s| s.to_string()).collect();

        if rtype == "SOA" {
            // mname rname serial refresh retry expire minimum
            let serial = data.get(2).ok_or_else(|| ParseError::MissingField {
                line: self.line_number,
                field: "SOA serial".to_string(),
            })?;
            zone.serial = Some(serial.parse::<u32>().map_err(|_| ParseError::InvalidSoaSerial {
                line: self.line_number,
                serial: serial.clone(),
            })?);
        }

        zone.entries.push(ZoneEntry {
            line: self.line_number,
            owner,
            rtype,
            data,
        });

        Ok(())
    }

    fn parse_directive(&mut self, zone: &mut ParsedZone, parts: &[&str]) -> Result<()> {
        let value = parts.get(1).ok_or_else(|| ParseError::MissingField {
            line: self.line_number,
            field: format!("{} value", parts[0]),
        })?;

        match parts[0].to_uppercase().as_str() {
            "$TTL" => {
                zone.default_ttl = Some(value.parse::<u32>().map_err(|_| ParseError::InvalidTtl {
                    line: self.line_number,
                    ttl: value.to_string(),
                })?);
            }
            "$ORIGIN" => zone.origin = Some(value.to_string()),
            other => {
                return Err(ParseError::InvalidSyntax {
                    line: self.line_number,
                    message: format!("Unsupported directive: {}", other),
                });
            }
        }

        Ok(())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// SOA serial of the zone file at `path`, if it exists and parses
pub fn read_serial(path: &Path) -> Option<u32> {
    match ZoneReader::new().parse_file(path) {
        Ok(Ok(zone)) => zone.serial,
        Ok(Err(e)) => {
            log::warn!("Ignoring unparsable zone file {}: {}", path.display(), e);
            None
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARD: &str = "$TTL 604800
@   IN  SOA ns1.home.local. admin.home.local. (
        2024031512
        604800
        86400
        2419200
        604800 )

@       IN  NS      ns1.home.local.
ns1     IN  A       192.168.0.5

pc1    IN  A   192.168.0.10
";

    #[test]
    fn test_parse_generated_forward_zone() {
        let zone = ZoneReader::new().parse_string(FORWARD).unwrap();

        assert_eq!(zone.default_ttl, Some(604800));
        assert_eq!(zone.serial, Some(2024031512));
        assert_eq!(
            zone.a_records(),
            vec![
                ("ns1".to_string(), Ipv4Addr::new(192, 168, 0, 5)),
                ("pc1".to_string(), Ipv4Addr::new(192, 168, 0, 10)),
            ]
        );
    }

    #[test]
    fn test_owner_inheritance_and_comments() {
        let content = "$ORIGIN 0.168.192.in-addr.arpa.\n\
10 3600 IN PTR pc1.home.local. ; desk\n\
\x20  IN PTR alias.home.local.\n";
        let zone = ZoneReader::new().parse_string(content).unwrap();

        assert_eq!(zone.origin.as_deref(), Some("0.168.192.in-addr.arpa."));
        assert_eq!(
            zone.ptr_records(),
            vec![
                ("10".to_string(), "pc1.home.local.".to_string()),
                ("10".to_string(), "alias.home.local.".to_string()),
            ]
        );
    }

    #[test]
    fn test_unclosed_parentheses() {
        let content = "@ IN SOA ns1. admin. (\n 1\n 2\n";
        match ZoneReader::new().parse_string(content) {
            Err(ParseError::InvalidSyntax { line, .. }) => assert_eq!(line, 1),
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_serial() {
        let content = "@ IN SOA ns1. admin. ( abc 1 2 3 4 )\n";
        assert!(matches!(
            ZoneReader::new().parse_string(content),
            Err(ParseError::InvalidSoaSerial { .. })
        ));
    }

    #[test]
    fn test_read_serial_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_serial(&dir.path().join("absent")), None);
    }
}
