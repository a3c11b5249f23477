use super::*;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::dns::process::ExecutionError;
use crate::dns::zone_writer::{ReverseNetwork, SerialPolicy, ZoneConfig};

#[derive(Default)]
struct CountingReloader {
    calls: Arc<AtomicUsize>,
}

impl Reloader for CountingReloader {
    fn reload(&self) -> std::result::Result<(), ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingReloader;

impl Reloader for FailingReloader {
    fn reload(&self) -> std::result::Result<(), ExecutionError> {
        Err(ExecutionError::Timeout {
            command: "systemctl reload bind9".to_string(),
            timeout: Duration::from_secs(10),
        })
    }
}

fn home_zones(dir: &Path) -> ZoneWriter {
    ZoneWriter::new(
        ZoneConfig {
            domain: "home.local".to_string(),
            nameserver: Ipv4Addr::new(192, 168, 0, 5),
            reverse_network: ReverseNetwork::new(192, 168, 0),
        },
        dir.join("db.home.local"),
        dir.join("db.192.168.0"),
        SerialPolicy::Hourly,
    )
}

fn create_test_authority(dir: &Path) -> (Authority, Arc<AtomicUsize>) {
    let reloader = CountingReloader::default();
    let calls = reloader.calls.clone();
    let authority = Authority::new(
        RecordStore::new(dir.join("webdns/records.txt")),
        home_zones(dir),
        Box::new(reloader),
    );
    (authority, calls)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_upsert_writes_all_files() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, calls) = create_test_authority(dir.path());

    let outcome = authority.upsert("pc1", "192.168.0.10").unwrap();

    assert_eq!(outcome.reload, ReloadStatus::Reloaded);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(read(authority.store().path()), "pc1 192.168.0.10\n");

    let forward = read(&authority.zones().forward_path);
    assert!(forward.contains("\npc1    IN  A   192.168.0.10\n"));
    assert!(forward.contains(&format!("        {}\n", outcome.documents.serial)));

    let reverse = read(&authority.zones().reverse_path);
    assert!(reverse.contains("\n10    IN  PTR pc1.home.local.\n"));
    assert_eq!(reverse, outcome.documents.reverse);
}

#[test]
fn test_upsert_replaces_existing_address() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, _) = create_test_authority(dir.path());

    authority.upsert("pc1", "192.168.0.10").unwrap();
    authority.upsert("nas", "192.168.0.20").unwrap();
    let outcome = authority.upsert("pc1", "192.168.0.11").unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(
        read(authority.store().path()),
        "nas 192.168.0.20\npc1 192.168.0.11\n"
    );
    let forward = read(&authority.zones().forward_path);
    assert!(!forward.contains("192.168.0.10"));
}

#[test]
fn test_delete_missing_name_still_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, calls) = create_test_authority(dir.path());

    authority.upsert("pc1", "192.168.0.10").unwrap();
    let outcome = authority.delete_record("ghost").unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(read(authority.store().path()), "pc1 192.168.0.10\n");
}

#[test]
fn test_delete_removes_ptr() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, _) = create_test_authority(dir.path());

    authority.upsert("pc1", "192.168.0.10").unwrap();
    authority.delete_record("pc1").unwrap();

    assert_eq!(read(authority.store().path()), "");
    assert!(!read(&authority.zones().reverse_path).contains("PTR"));
    assert!(authority.records().unwrap().is_empty());
}

#[test]
fn test_delete_hand_edited_names() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, calls) = create_test_authority(dir.path());
    fs::create_dir_all(dir.path().join("webdns")).unwrap();
    fs::write(
        authority.store().path(),
        "pc_1 192.168.0.30\nprinter.lan 192.168.0.31\npc1 192.168.0.10\n",
    )
    .unwrap();

    let names: Vec<String> = authority.records().unwrap().iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["pc_1", "printer.lan", "pc1"]);

    authority.delete_record("pc_1").unwrap();
    let outcome = authority.delete_record(" printer.lan ").unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(read(authority.store().path()), "pc1 192.168.0.10\n");
    assert!(!read(&authority.zones().reverse_path).contains("printer.lan"));
}

#[test]
fn test_reload_failure_keeps_committed_files() {
    let dir = tempfile::tempdir().unwrap();
    let authority = Authority::new(
        RecordStore::new(dir.path().join("records.txt")),
        home_zones(dir.path()),
        Box::new(FailingReloader),
    );

    let outcome = authority.upsert("pc1", "192.168.0.10").unwrap();

    match outcome.reload {
        ReloadStatus::Failed(message) => assert!(message.contains("bind9")),
        other => panic!("Expected reload failure, got {:?}", other),
    }
    assert_eq!(read(authority.store().path()), "pc1 192.168.0.10\n");
    assert!(read(&authority.zones().forward_path).contains("pc1"));
}

#[test]
fn test_invalid_input_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, calls) = create_test_authority(dir.path());
    authority.upsert("pc1", "192.168.0.10").unwrap();
    let forward_before = read(&authority.zones().forward_path);

    assert!(matches!(
        authority.upsert("pc2", "192.168.0.300"),
        Err(AuthorityError::Validation(ValidationError::InvalidIpAddress(_)))
    ));
    assert!(matches!(
        authority.upsert("", "192.168.0.12"),
        Err(AuthorityError::Validation(ValidationError::EmptyField("name")))
    ));
    assert!(matches!(
        authority.delete_record("  "),
        Err(AuthorityError::Validation(ValidationError::EmptyField("name")))
    ));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(read(authority.store().path()), "pc1 192.168.0.10\n");
    assert_eq!(read(&authority.zones().forward_path), forward_before);
}

#[test]
fn test_storage_failure_leaves_records_intact() {
    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("records.txt");
    fs::write(&records_path, "pc1 192.168.0.10\n").unwrap();

    // a regular file where the reverse zone directory should be
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let mut zones = home_zones(dir.path());
    zones.reverse_path = blocker.join("db.192.168.0");

    let reloader = CountingReloader::default();
    let calls = reloader.calls.clone();
    let authority = Authority::new(RecordStore::new(&records_path), zones, Box::new(reloader));

    assert!(matches!(
        authority.upsert("pc2", "192.168.0.12"),
        Err(AuthorityError::Storage(_))
    ));
    assert_eq!(read(&records_path), "pc1 192.168.0.10\n");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_upserts_all_survive() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, calls) = create_test_authority(dir.path());
    let authority = Arc::new(authority);

    let handles: Vec<_> = (1..=8u8)
        .map(|i| {
            let authority = authority.clone();
            thread::spawn(move || {
                authority
                    .upsert(&format!("host{}", i), &format!("192.168.0.{}", 100 + i))
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let records = authority.records().unwrap();
    assert_eq!(records.len(), 8);
    for i in 1..=8u8 {
        assert_eq!(
            records.get(&format!("host{}", i)).map(|r| r.address),
            Some(Ipv4Addr::new(192, 168, 0, 100 + i))
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);

    let report = authority.check().unwrap();
    assert!(report.is_in_sync(), "{:?}", report);
}

#[test]
fn test_two_authorities_on_same_files_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    // stands in for the web server and the CLI working on the same store
    let (server, _) = create_test_authority(dir.path());
    let (cli, _) = create_test_authority(dir.path());
    let authorities = [Arc::new(server), Arc::new(cli)];

    let handles: Vec<_> = (1..=8u8)
        .map(|i| {
            let authority = authorities[usize::from(i % 2)].clone();
            thread::spawn(move || {
                for round in 0..3u8 {
                    authority
                        .upsert(&format!("host{}", i), &format!("192.168.0.{}", 10 * i + round))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let records = authorities[0].records().unwrap();
    assert_eq!(records.len(), 8);
    for i in 1..=8u8 {
        assert_eq!(
            records.get(&format!("host{}", i)).map(|r| r.address),
            Some(Ipv4Addr::new(192, 168, 0, 10 * i + 2))
        );
    }
    assert!(authorities[1].check().unwrap().is_in_sync());
}

#[test]
fn test_regenerate_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, calls) = create_test_authority(dir.path());
    fs::create_dir_all(dir.path().join("webdns")).unwrap();
    fs::write(
        authority.store().path(),
        "# hand edited\npc1 192.168.0.10\nbroken line here\nvpn 10.0.0.5\n",
    )
    .unwrap();

    let outcome = authority.regenerate().unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(read(&authority.zones().forward_path).contains("vpn    IN  A   10.0.0.5"));
    assert!(!read(&authority.zones().reverse_path).contains("vpn"));
}

#[test]
fn test_check_reports_drift() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, _) = create_test_authority(dir.path());
    authority.upsert("pc1", "192.168.0.10").unwrap();

    let report = authority.check().unwrap();
    assert!(report.is_in_sync());
    assert_eq!(report.skipped_lines, 0);

    // store edited by hand without regenerating
    fs::write(
        authority.store().path(),
        "pc1 192.168.0.10\nnas 192.168.0.20\nnot-an-address x\n",
    )
    .unwrap();

    let report = authority.check().unwrap();
    assert!(!report.is_in_sync());
    assert_eq!(report.skipped_lines, 1);
    assert_eq!(report.missing_forward, vec!["nas 192.168.0.20".to_string()]);
    assert_eq!(report.missing_reverse, vec!["20 nas.home.local.".to_string()]);
    assert!(report.unexpected_forward.is_empty());
}

#[test]
fn test_check_on_fresh_install() {
    let dir = tempfile::tempdir().unwrap();
    let (authority, _) = create_test_authority(dir.path());
    authority.ensure_initialized().unwrap();

    let report = authority.check().unwrap();
    assert_eq!(report.forward_serial, None);
    assert!(report.is_in_sync());
}
