//! Contains the authoritative host list and keeps the zone files in step with it
//!
//! ## Mutation cycle
//!
//! Every mutation runs the same sequence while holding the writer lock, an
//! in-process mutex plus an advisory lock on the store's lock file so that
//! the CLI and the web server never interleave:
//!
//! 1. make sure the store file and both zone files exist
//! 2. load the record set from disk
//! 3. apply the change
//! 4. stage the new store file and both zone documents as temporary files
//! 5. commit all three by rename
//!
//! Only after the lock is released is the name server asked to reload. A failed
//! staging step leaves every file as it was; a failed reload leaves the
//! committed files in place and is reported in [`MutationOutcome::reload`].
//!
//! Reads do not take the lock. Commits are renames, so a reader sees either
//! the old or the new file, never a partial one.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use chrono::Local;
use parking_lot::Mutex;
use serde_derive::Serialize;

use crate::dns::logging::{log_mutation, CorrelationContext, MutationLog};
use crate::dns::record_store::{ensure_file, Record, RecordSet, RecordStore, StorageError};
use crate::dns::reload::Reloader;
use crate::dns::validation::{
    validate_host_label, validate_ipv4_address, validate_record_name, ValidationError,
};
use crate::dns::zone_reader::{ParseError, ZoneReader};
use crate::dns::zone_writer::{ZoneDocuments, ZoneWriter};

#[derive(Debug)]
pub enum AuthorityError {
    Storage(StorageError),
    Validation(ValidationError),
    ZoneParse { path: String, error: ParseError },
}

impl std::fmt::Display for AuthorityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorityError::Storage(e) => write!(f, "Storage error: {}", e),
            AuthorityError::Validation(e) => write!(f, "{}", e),
            AuthorityError::ZoneParse { path, error } => {
                write!(f, "Zone file {} is unreadable: {}", path, error)
            }
        }
    }
}

impl std::error::Error for AuthorityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthorityError::Storage(e) => Some(e),
            AuthorityError::Validation(e) => Some(e),
            AuthorityError::ZoneParse { error, .. } => Some(error),
        }
    }
}

impl From<StorageError> for AuthorityError {
    fn from(err: StorageError) -> Self {
        AuthorityError::Storage(err)
    }
}

impl From<ValidationError> for AuthorityError {
    fn from(err: ValidationError) -> Self {
        AuthorityError::Validation(err)
    }
}

type Result<T> = std::result::Result<T, AuthorityError>;

/// Result of asking the name server to reload
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum ReloadStatus {
    Reloaded,
    Failed(String),
}

impl ReloadStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ReloadStatus::Reloaded)
    }
}

/// What a committed mutation produced
#[derive(Clone, Debug)]
pub struct MutationOutcome {
    pub records: RecordSet,
    pub documents: ZoneDocuments,
    pub reload: ReloadStatus,
}

/// Differences between the record store and the zone files on disk
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub skipped_lines: usize,
    pub forward_serial: Option<u32>,
    pub reverse_serial: Option<u32>,
    /// `name address` pairs in the store without a matching A record
    pub missing_forward: Vec<String>,
    /// A records in the forward zone that the store does not contain
    pub unexpected_forward: Vec<String>,
    /// `octet name` pairs expected in the reverse zone but absent
    pub missing_reverse: Vec<String>,
    /// PTR records in the reverse zone that the store does not account for
    pub unexpected_reverse: Vec<String>,
}

impl SyncReport {
    pub fn is_in_sync(&self) -> bool {
        self.missing_forward.is_empty()
            && self.unexpected_forward.is_empty()
            && self.missing_reverse.is_empty()
            && self.unexpected_reverse.is_empty()
            && self.forward_serial == self.reverse_serial
    }
}

pub struct Authority {
    store: RecordStore,
    zones: ZoneWriter,
    reloader: Box<dyn Reloader>,
    write_lock: Mutex<()>,
}

impl Authority {
    pub fn new(store: RecordStore, zones: ZoneWriter, reloader: Box<dyn Reloader>) -> Authority {
        Authority {
            store,
            zones,
            reloader,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn zones(&self) -> &ZoneWriter {
        &self.zones
    }

    /// Create the store file and both zone files if they are missing.
    pub fn ensure_initialized(&self) -> Result<()> {
        self.store.ensure_initialized()?;
        for path in self.zones.paths().iter() {
            ensure_file(path)?;
        }
        Ok(())
    }

    /// Current record set, read fresh from disk
    pub fn records(&self) -> Result<RecordSet> {
        self.ensure_initialized()?;
        Ok(self.store.load()?)
    }

    /// Add `name` or point it at a new address.
    pub fn upsert(&self, name: &str, address: &str) -> Result<MutationOutcome> {
        let ctx = CorrelationContext::new("authority", "upsert");
        let checked = validate_host_label(name)
            .and_then(|name| Ok((name, validate_ipv4_address(address)?)));

        let (name, addr) = match checked {
            Ok(x) => x,
            Err(e) => return Err(self.fail(&ctx, "upsert", Some(name), Some(address), e.into())),
        };

        let addr_text = addr.to_string();
        self.mutate(&ctx, "upsert", Some(&name), Some(&addr_text), |records| {
            records.upsert(&name, addr)
        })
    }

    /// Remove `name`. Any stored name can be removed, including hand-edited
    /// ones that would not pass as a new label. Removing a name that does not
    /// exist still regenerates the zones and reloads.
    pub fn delete_record(&self, name: &str) -> Result<MutationOutcome> {
        let ctx = CorrelationContext::new("authority", "delete");
        let name = match validate_record_name(name) {
            Ok(x) => x,
            Err(e) => return Err(self.fail(&ctx, "delete", Some(name), None, e.into())),
        };

        self.mutate(&ctx, "delete", Some(&name), None, |records| records.remove(&name))
    }

    /// Rewrite both zone files from the store without changing it.
    pub fn regenerate(&self) -> Result<MutationOutcome> {
        let ctx = CorrelationContext::new("authority", "regenerate");
        self.mutate(&ctx, "regenerate", None, None, |records| records)
    }

    fn mutate<F>(
        &self,
        ctx: &CorrelationContext,
        operation: &str,
        host: Option<&str>,
        address: Option<&str>,
        apply: F,
    ) -> Result<MutationOutcome>
    where
        F: FnOnce(RecordSet) -> RecordSet,
    {
        let committed = {
            let _guard = self.write_lock.lock();
            self.store
                .lock()
                .map_err(AuthorityError::from)
                .and_then(|_store_lock| self.commit_locked(apply))
        };

        let (records, documents) = match committed {
            Ok(x) => x,
            Err(e) => return Err(self.fail(ctx, operation, host, address, e)),
        };

        let reload = match self.reloader.reload() {
            Ok(()) => ReloadStatus::Reloaded,
            Err(e) => {
                log::warn!("Name server reload failed: {}", e);
                ReloadStatus::Failed(e.to_string())
            }
        };

        log_mutation(
            ctx,
            &MutationLog {
                operation: operation.to_string(),
                host: host.map(str::to_string),
                address: address.map(str::to_string),
                record_count: records.len(),
                serial: Some(documents.serial),
                reload_ok: Some(reload.is_ok()),
                error: None,
            },
        );

        Ok(MutationOutcome {
            records,
            documents,
            reload,
        })
    }

    fn commit_locked<F>(&self, apply: F) -> Result<(RecordSet, ZoneDocuments)>
    where
        F: FnOnce(RecordSet) -> RecordSet,
    {
        self.ensure_initialized()?;
        let records = apply(self.store.load()?);
        let documents = self.zones.generate(&records, &Local::now());

        let staged_records = self.store.stage(&records)?;
        let staged_zones = self.zones.stage(&documents)?;

        staged_records.commit()?;
        staged_zones.commit()?;

        Ok((records, documents))
    }

    fn fail(
        &self,
        ctx: &CorrelationContext,
        operation: &str,
        host: Option<&str>,
        address: Option<&str>,
        error: AuthorityError,
    ) -> AuthorityError {
        log_mutation(
            ctx,
            &MutationLog {
                operation: operation.to_string(),
                host: host.map(str::to_string),
                address: address.map(str::to_string),
                record_count: 0,
                serial: None,
                reload_ok: None,
                error: Some(error.to_string()),
            },
        );
        error
    }

    /// Compare the zone files on disk against what the store says they
    /// should contain.
    pub fn check(&self) -> Result<SyncReport> {
        let (records, skipped_lines) = self.store.load_with_skipped()?;

        let forward = self.read_zone(&self.zones.forward_path)?;
        let reverse = self.read_zone(&self.zones.reverse_path)?;

        let config = &self.zones.config;

        let expected_forward: Vec<String> = records.iter().map(Record::to_string).collect();
        let actual_forward: Vec<String> = forward
            .a_records()
            .into_iter()
            .filter(|(owner, addr)| !(owner == "ns1" && *addr == config.nameserver))
            .map(|(owner, addr)| format!("{} {}", owner, addr))
            .collect();

        let expected_reverse: Vec<String> = records
            .iter()
            .filter(|r| config.reverse_network.contains(r.address))
            .map(|r| ptr_key(r.address, &format!("{}.{}.", r.name, config.domain)))
            .collect();
        let actual_reverse: Vec<String> = reverse
            .ptr_records()
            .into_iter()
            .map(|(owner, target)| format!("{} {}", owner, target))
            .collect();

        Ok(SyncReport {
            skipped_lines,
            forward_serial: forward.serial,
            reverse_serial: reverse.serial,
            missing_forward: difference(&expected_forward, &actual_forward),
            unexpected_forward: difference(&actual_forward, &expected_forward),
            missing_reverse: difference(&expected_reverse, &actual_reverse),
            unexpected_reverse: difference(&actual_reverse, &expected_reverse),
        })
    }

    fn read_zone(&self, path: &std::path::Path) -> Result<crate::dns::zone_reader::ParsedZone> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                }
                .into())
            }
        };

        ZoneReader::new()
            .parse_string(&content)
            .map_err(|error| AuthorityError::ZoneParse {
                path: path.display().to_string(),
                error,
            })
    }
}

fn ptr_key(addr: Ipv4Addr, target: &str) -> String {
    format!("{} {}", addr.octets()[3], target)
}

/// Items of `left` not present in `right`, in `left` order
fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&String> = right.iter().collect();
    left.iter().filter(|x| !right.contains(x)).cloned().collect()
}

#[cfg(test)]
#[path = "authority_test.rs"]
mod authority_test;
