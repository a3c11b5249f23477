//! Forward and reverse zone file generation
//!
//! Both documents are rebuilt from scratch out of the full record set on every
//! change. The layout follows the BIND9 `db.*` convention:
//!
//! ```text
//! $TTL 604800
//! @   IN  SOA ns1.home.local. admin.home.local. (
//!         2024031512
//!         604800
//!         86400
//!         2419200
//!         604800 )
//!
//! @       IN  NS      ns1.home.local.
//! ns1     IN  A       192.168.0.5
//!
//! pc1    IN  A   192.168.0.10
//! ```
//!
//! The reverse document carries the same header minus the `ns1` address line
//! and one PTR per record inside the configured /24.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde_derive::{Deserialize, Serialize};

use crate::dns::record_store::{RecordSet, StagedFile, StorageError};
use crate::dns::zone_reader;

pub const DEFAULT_TTL: u32 = 604800;
pub const SOA_REFRESH: u32 = 604800;
pub const SOA_RETRY: u32 = 86400;
pub const SOA_EXPIRE: u32 = 2419200;
pub const SOA_MINIMUM: u32 = 604800;

/// The first three octets of the network served by the reverse zone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReverseNetwork([u8; 3]);

impl ReverseNetwork {
    pub fn new(a: u8, b: u8, c: u8) -> ReverseNetwork {
        ReverseNetwork([a, b, c])
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        addr.octets()[..3] == self.0
    }

    /// Zone name as used in a `named.conf` zone statement, e.g. `0.168.192.in-addr.arpa`
    pub fn arpa_zone(&self) -> String {
        format!("{}.{}.{}.in-addr.arpa", self.0[2], self.0[1], self.0[0])
    }
}

impl fmt::Display for ReverseNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidReverseNetwork(pub String);

impl fmt::Display for InvalidReverseNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid reverse network '{}': expected three octets such as 192.168.0",
            self.0
        )
    }
}

impl std::error::Error for InvalidReverseNetwork {}

impl FromStr for ReverseNetwork {
    type Err = InvalidReverseNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets = s
            .trim()
            .trim_end_matches('.')
            .split('.')
            .map(|part| part.parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| InvalidReverseNetwork(s.to_string()))?;

        match octets.as_slice() {
            [a, b, c] => Ok(ReverseNetwork::new(*a, *b, *c)),
            _ => Err(InvalidReverseNetwork(s.to_string())),
        }
    }
}

/// How the SOA serial is chosen for each generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialPolicy {
    /// `YYYYMMDDHH` of the generation time. Stays the same for every
    /// generation within one clock hour.
    Hourly,
    /// Previous serial plus one, never lower than the hourly value.
    Incrementing,
}

impl Default for SerialPolicy {
    fn default() -> Self {
        SerialPolicy::Hourly
    }
}

impl SerialPolicy {
    pub fn next_serial<Tz: TimeZone>(&self, now: &DateTime<Tz>, previous: Option<u32>) -> u32 {
        let hourly = hourly_serial(now);
        match (self, previous) {
            (SerialPolicy::Hourly, _) | (SerialPolicy::Incrementing, None) => hourly,
            (SerialPolicy::Incrementing, Some(prev)) => hourly.max(prev.saturating_add(1)),
        }
    }
}

impl FromStr for SerialPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(SerialPolicy::Hourly),
            "incrementing" => Ok(SerialPolicy::Incrementing),
            other => Err(format!("Unknown serial policy: {}", other)),
        }
    }
}

/// Serial for `time` truncated to the hour, e.g. `2024031512`
pub fn hourly_serial<Tz: TimeZone>(time: &DateTime<Tz>) -> u32 {
    let year = time.year().max(0) as u32;
    year * 1_000_000 + time.month() * 10_000 + time.day() * 100 + time.hour()
}

/// Zone-wide parameters that do not come from the record set
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneConfig {
    pub domain: String,
    pub nameserver: Ipv4Addr,
    pub reverse_network: ReverseNetwork,
}

impl ZoneConfig {
    pub fn nameserver_host(&self) -> String {
        format!("ns1.{}.", self.domain)
    }

    pub fn admin_mailbox(&self) -> String {
        format!("admin.{}.", self.domain)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneDocuments {
    pub serial: u32,
    pub forward: String,
    pub reverse: String,
}

fn soa_header(config: &ZoneConfig, serial: u32) -> String {
    format!(
        "$TTL {ttl}\n\
         @   IN  SOA {ns} {admin} (\n\
         \x20       {serial}\n\
         \x20       {refresh}\n\
         \x20       {retry}\n\
         \x20       {expire}\n\
         \x20       {minimum} )\n\
         \n\
         @       IN  NS      {ns}\n",
        ttl = DEFAULT_TTL,
        ns = config.nameserver_host(),
        admin = config.admin_mailbox(),
        serial = serial,
        refresh = SOA_REFRESH,
        retry = SOA_RETRY,
        expire = SOA_EXPIRE,
        minimum = SOA_MINIMUM,
    )
}

/// Header followed by one line per entry, newline terminated
fn assemble(header: String, lines: Vec<String>) -> String {
    let mut doc = header;
    for line in lines {
        doc.push('\n');
        doc.push_str(&line);
    }
    doc.push('\n');
    doc
}

pub fn render_forward(records: &RecordSet, config: &ZoneConfig, serial: u32) -> String {
    let mut header = soa_header(config, serial);
    header.push_str(&format!("ns1     IN  A       {}\n", config.nameserver));

    let lines = records
        .iter()
        .map(|r| format!("{}    IN  A   {}", r.name, r.address))
        .collect();

    assemble(header, lines)
}

pub fn render_reverse(records: &RecordSet, config: &ZoneConfig, serial: u32) -> String {
    let lines = records
        .iter()
        .filter(|r| config.reverse_network.contains(r.address))
        .map(|r| {
            format!(
                "{}    IN  PTR {}.{}.",
                r.address.octets()[3],
                r.name,
                config.domain
            )
        })
        .collect();

    assemble(soa_header(config, serial), lines)
}

/// Render both documents. Pure: identical inputs give identical output.
pub fn render(records: &RecordSet, config: &ZoneConfig, serial: u32) -> ZoneDocuments {
    ZoneDocuments {
        serial,
        forward: render_forward(records, config, serial),
        reverse: render_reverse(records, config, serial),
    }
}

/// Both zone documents written to temporary files, not yet visible
#[derive(Debug)]
pub struct StagedZones {
    pub forward: StagedFile,
    pub reverse: StagedFile,
}

impl StagedZones {
    pub fn commit(self) -> Result<(), StorageError> {
        self.forward.commit()?;
        self.reverse.commit()
    }
}

/// Renders zone documents to their configured destinations
#[derive(Clone, Debug)]
pub struct ZoneWriter {
    pub config: ZoneConfig,
    pub forward_path: PathBuf,
    pub reverse_path: PathBuf,
    pub serial_policy: SerialPolicy,
}

impl ZoneWriter {
    pub fn new(
        config: ZoneConfig,
        forward_path: PathBuf,
        reverse_path: PathBuf,
        serial_policy: SerialPolicy,
    ) -> ZoneWriter {
        ZoneWriter {
            config,
            forward_path,
            reverse_path,
            serial_policy,
        }
    }

    pub fn paths(&self) -> [&Path; 2] {
        [&self.forward_path, &self.reverse_path]
    }

    /// Render documents for `now`, consulting the current forward zone file
    /// when the serial policy depends on the previous value.
    pub fn generate(&self, records: &RecordSet, now: &DateTime<Local>) -> ZoneDocuments {
        let previous = match self.serial_policy {
            SerialPolicy::Hourly => None,
            SerialPolicy::Incrementing => zone_reader::read_serial(&self.forward_path),
        };
        let serial = self.serial_policy.next_serial(now, previous);
        render(records, &self.config, serial)
    }

    pub fn stage(&self, documents: &ZoneDocuments) -> Result<StagedZones, StorageError> {
        Ok(StagedZones {
            forward: StagedFile::stage(&self.forward_path, &documents.forward)?,
            reverse: StagedFile::stage(&self.reverse_path, &documents.reverse)?,
        })
    }
}
