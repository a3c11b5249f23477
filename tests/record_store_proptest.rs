//! Property-based testing for the record store and zone rendering using proptest

use proptest::prelude::*;
use std::net::Ipv4Addr;

use localdns::dns::record_store::{RecordSet, RecordStore};
use localdns::dns::zone_writer::{render, ReverseNetwork, ZoneConfig};

// Strategy for generating single host labels
fn label_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,14}[a-z0-9]"
}

// Strategy for generating IPv4 addresses, half of them inside 192.168.0.0/24
fn ipv4_strategy() -> impl Strategy<Value = Ipv4Addr> {
    prop_oneof![
        any::<u8>().prop_map(|d| Ipv4Addr::new(192, 168, 0, d)),
        (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(a, b, c, d)| Ipv4Addr::new(a, b, c, d)),
    ]
}

fn operations_strategy() -> impl Strategy<Value = Vec<(String, Option<Ipv4Addr>)>> {
    prop::collection::vec((label_strategy(), prop::option::of(ipv4_strategy())), 0..40)
}

fn apply(ops: &[(String, Option<Ipv4Addr>)]) -> RecordSet {
    ops.iter().fold(RecordSet::new(), |set, (name, addr)| match addr {
        Some(addr) => set.upsert(name, *addr),
        None => set.remove(name),
    })
}

fn home_config() -> ZoneConfig {
    ZoneConfig {
        domain: "home.local".to_string(),
        nameserver: Ipv4Addr::new(192, 168, 0, 5),
        reverse_network: ReverseNetwork::new(192, 168, 0),
    }
}

proptest! {
    #[test]
    fn test_names_stay_unique(ops in operations_strategy()) {
        let set = apply(&ops);

        let mut names: Vec<&str> = set.iter().map(|r| r.name.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        prop_assert_eq!(names.len(), total);
    }

    #[test]
    fn test_last_write_wins(ops in operations_strategy(), name in label_strategy(), addr in ipv4_strategy()) {
        let set = apply(&ops).upsert(&name, addr);

        prop_assert_eq!(set.get(&name).map(|r| r.address), Some(addr));
        prop_assert_eq!(set.iter().last().map(|r| r.name.clone()), Some(name.clone()));

        let removed = set.remove(&name);
        prop_assert!(removed.get(&name).is_none());
    }

    #[test]
    fn test_file_contents_reparse(ops in operations_strategy()) {
        let set = apply(&ops);
        let contents = set.to_file_contents();

        let (parsed, skipped) = RecordSet::parse(&contents);
        prop_assert_eq!(skipped, 0);
        prop_assert_eq!(&parsed, &set);
        prop_assert_eq!(parsed.to_file_contents(), contents);
    }

    #[test]
    fn test_save_load_stable(ops in operations_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("records.txt"));
        let set = apply(&ops);

        store.save(&set).unwrap();
        let first = std::fs::read(store.path()).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        let second = std::fs::read(store.path()).unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_reverse_zone_filtering(ops in operations_strategy(), serial in any::<u32>()) {
        let set = apply(&ops);
        let docs = render(&set, &home_config(), serial);

        let a_lines = docs.forward.lines().filter(|l| l.contains("    IN  A   ")).count();
        let ptr_lines = docs.reverse.lines().filter(|l| l.contains("    IN  PTR ")).count();
        let in_network = set
            .iter()
            .filter(|r| r.address.octets()[..3] == [192, 168, 0])
            .count();

        // plus the name server's own address line
        prop_assert_eq!(a_lines, set.len() + 1);
        prop_assert_eq!(ptr_lines, in_network);
        prop_assert_eq!(render(&set, &home_config(), serial), docs);
    }
}
