//! Local Name Management
//!
//! This module keeps the zone data of a local BIND9 name server:
//! * the persisted list of host records
//! * forward and reverse zone generation
//! * name server reload and diagnostic lookups
//!
//! # Module Structure
//!
//! * `record_store` - Record list persistence and staged file writes
//! * `zone_writer` - Zone document rendering and serial policy
//! * `zone_reader` - Reads generated zone files back for drift checks
//! * `authority` - Serialized mutations across store, zones and reload
//! * `context` - Settings and shared state

/// Serialized mutations across the record store and zone files
pub mod authority;

/// Settings and shared state
pub mod context;

/// Structured logging with correlation IDs
pub mod logging;

/// Diagnostic lookups
pub mod lookup;

/// Bounded execution of external commands
pub mod process;

/// Persisted record list
pub mod record_store;

/// Name server reload trigger
pub mod reload;

/// Input validation
pub mod validation;

/// Zone file reader
pub mod zone_reader;

/// Zone file generator
pub mod zone_writer;
