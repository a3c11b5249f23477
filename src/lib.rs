//! localdns
//!
//! Keeps a BIND9 forward zone and its matching reverse zone in step with a flat
//! list of `name address` records, with a small web interface and a CLI for
//! editing that list.
//!
//! # Features
//!
//! * Record store with atomic, all-or-nothing updates
//! * Forward (A) and reverse (PTR) zone generation with a fresh SOA serial
//! * Name server reload after every change
//! * Forward and reverse lookup tests through `nslookup`
//! * Drift check between the record list and the zone files on disk
//!
//! # Architecture
//!
//! * `dns` - Record store, zone generation and the external commands
//! * `web` - HTML and JSON management interface

/// Record store, zone generation and name server control
pub mod dns;

/// Web interface for managing host records
pub mod web;

/// Privilege checks
pub mod privilege_escalation;
