//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Hash chain: every `phash` is the hash of the preceding block
//! - Coverage: archive ranges and the live range tile `[0, log_length)`
//! - Migration: never grows the live store, never renumbers a block
//! - Queries: a full-window read returns every block exactly once, in order
//! - LEB128: encoding round-trips

use ledger_engine::{
    archive::{ArchiveIndex, MemoryProvisioner},
    crypto::hash_value,
    leb128, migration,
    store::LedgerStore,
    BlockRange, Config, Ledger, Settings, UnitProvisioner, Value,
};
use proptest::prelude::*;
use std::sync::Arc;

/// Strategy for generating ledger values
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<u64>().prop_map(Value::Nat),
        any::<i64>().prop_map(Value::Int),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
        "[a-z]{0,8}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|entries| Value::Map(entries.into_iter().collect())),
        ]
    })
}

/// Strategy for generating valid archiving settings
fn settings_strategy() -> impl Strategy<Value = Settings> {
    (2u64..10, 1u64..8, 1u64..8)
        .prop_flat_map(|(max, per_unit, per_pass)| {
            (Just(max), 0..=max, Just(per_unit), Just(per_pass))
        })
        .prop_map(|(max, settle, per_unit, per_pass)| Settings {
            max_active_records: max,
            settle_to_records: settle,
            max_records_in_archive_instance: per_unit,
            max_records_to_archive: per_pass,
            archive_funding: 1,
            ..Settings::default()
        })
}

/// Create test ledger with an unbounded provisioner
async fn create_test_ledger(settings: Settings) -> (Ledger, Arc<MemoryProvisioner>) {
    let provisioner = Arc::new(MemoryProvisioner::new(u64::MAX));
    let config = Config {
        settings,
        ..Config::default()
    };
    let ledger = Ledger::open(config, provisioner.clone()).await.unwrap();
    (ledger, provisioner)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: each block's phash is the hash of its predecessor
    #[test]
    fn prop_hash_chain(records in prop::collection::vec(value_strategy(), 1..30)) {
        let mut store = LedgerStore::new();
        for record in &records {
            store.append(record.clone(), None);
        }

        let blocks: Vec<&Value> = store.iter().collect();
        prop_assert!(blocks[0].parent_hash().is_none());
        for pair in blocks.windows(2) {
            prop_assert_eq!(pair[1].parent_hash(), Some(hash_value(pair[0])));
        }
        prop_assert_eq!(store.latest_hash(), Some(hash_value(blocks[blocks.len() - 1])));
        prop_assert!(store.verify_chain().is_ok());
    }

    /// Property: map entry order never changes the hash
    #[test]
    fn prop_map_hash_order_independent(
        entries in prop::collection::btree_map("[a-z]{1,6}", value_strategy(), 0..8)
    ) {
        let forward: Vec<(String, Value)> = entries.into_iter().collect();
        let mut backward = forward.clone();
        backward.reverse();

        prop_assert_eq!(
            hash_value(&Value::Map(forward)),
            hash_value(&Value::Map(backward))
        );
    }

    /// Property: LEB128 round-trips for all naturals
    #[test]
    fn prop_leb128_roundtrip(n in any::<u64>()) {
        let encoded = leb128::encode(n);
        prop_assert!(encoded.len() <= 10);
        prop_assert_eq!(leb128::decode(&encoded).unwrap(), n);
    }

    /// Property: migration passes never grow the live store or renumber blocks
    #[test]
    fn prop_migration_never_loses_blocks(
        settings in settings_strategy(),
        n in 0u64..60,
        rejects in prop::collection::vec(any::<bool>(), 1..20),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let provisioner = Arc::new(MemoryProvisioner::new(u64::MAX));
            let mut store = LedgerStore::new();
            let mut index = ArchiveIndex::new();
            let mut pending = None;

            let mut hashes = Vec::new();
            for i in 0..n {
                store.append(Value::Nat(i), None);
                hashes.push(hash_value(store.get(i).unwrap()));
            }

            for reject in rejects {
                provisioner.set_reject_transfers(reject);
                let (live_before, first_before) = (store.live_len(), store.first_index());

                let Some(plan) = migration::plan(&store, &index, pending, &settings).unwrap() else {
                    break;
                };
                let report = migration::run_pass(plan, provisioner.clone()).await;
                pending = migration::apply(report, &mut store, &mut index, pending).unwrap();

                prop_assert!(store.live_len() <= live_before);
                prop_assert_eq!(store.log_length(), n);
                if reject {
                    prop_assert_eq!(store.first_index(), first_before);
                }

                let mut expected_start = 0;
                for range in index.iter() {
                    prop_assert_eq!(range.start, expected_start);
                    prop_assert!(range.length <= settings.max_records_in_archive_instance);
                    expected_start = range.end();
                }
                prop_assert_eq!(expected_start, store.first_index());
            }

            for range in index.iter() {
                let unit = provisioner.unit(&range.unit).unwrap();
                let archived = unit
                    .get_range(&[BlockRange::new(range.start, range.length)])
                    .await
                    .unwrap();
                prop_assert_eq!(archived.len() as u64, range.length);
                for (offset, block) in archived.iter().enumerate() {
                    prop_assert_eq!(block.id, range.start + offset as u64);
                    prop_assert_eq!(hash_value(&block.block), hashes[block.id as usize]);
                }
            }
            Ok(())
        })?;
    }

    /// Property: the full window resolves to every block once, in order
    #[test]
    fn prop_full_range_resolves(settings in settings_strategy(), n in 1u64..40) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let max_active = settings.max_active_records;
            let (ledger, _provisioner) = create_test_ledger(settings).await;

            for i in 0..n {
                ledger.append(Value::Nat(i), None).await.unwrap();
                ledger.wait_idle().await.unwrap();
            }

            let blocks = ledger.resolve_range(vec![BlockRange::new(0, n)]).await.unwrap();
            prop_assert_eq!(blocks.len() as u64, n);
            for (i, block) in blocks.iter().enumerate() {
                prop_assert_eq!(block.id, i as u64);
            }
            for pair in blocks.windows(2) {
                prop_assert_eq!(pair[1].block.parent_hash(), Some(hash_value(&pair[0].block)));
            }

            let state = ledger.export_state().await.unwrap();
            prop_assert!(state.check_invariants().is_ok());
            prop_assert!(state.blocks.len() as u64 <= max_active);
            prop_assert_eq!(state.log_length(), n);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
