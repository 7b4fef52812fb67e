//! Range query planning across the live store and archive units
//!
//! Planning is synchronous and reads one consistent snapshot of
//! `(first_index, log_length, archive index)`. Live blocks are returned
//! inline; anything below `first_index` becomes a delegation to the unit
//! owning it.
//!
//! Overlapping requests are folded: each inline block appears once, in index
//! order, and each delegation carries disjoint ranges.

use crate::{
    archive::ArchiveIndex,
    store::LedgerStore,
    types::{ArchivedRange, BlockRange, GetBlocksResult, UnitId},
    Error, Result,
};
use std::collections::BTreeMap;

/// Answer a batch of range requests
pub fn plan_range(
    store: &LedgerStore,
    index: &ArchiveIndex,
    requests: &[BlockRange],
) -> Result<GetBlocksResult> {
    let first_index = store.first_index();
    let log_length = store.log_length();

    let mut blocks = Vec::new();
    // Keyed by unit start so delegations come out ordered by index.
    let mut delegations: BTreeMap<u64, (UnitId, Vec<BlockRange>)> = BTreeMap::new();

    for request in requests.iter().filter(|r| r.length > 0) {
        let end = request.end();

        if end > first_index && request.start < log_length {
            blocks.extend(store.range(request.start, end));
        }

        if request.start < first_index {
            // Inclusive last index wanted from archives
            let wanted_last = end.min(first_index) - 1;
            let mut seek = request.start;

            for range in index.iter() {
                let Some(last) = range.last() else {
                    continue;
                };
                if last < seek {
                    continue;
                }
                if range.start > seek {
                    break;
                }

                let sub_last = last.min(wanted_last);
                delegations
                    .entry(range.start)
                    .or_insert_with(|| (range.unit, Vec::new()))
                    .1
                    .push(BlockRange::new(seek, sub_last - seek + 1));

                seek = sub_last + 1;
                if seek > wanted_last {
                    break;
                }
            }

            if seek <= wanted_last {
                tracing::error!(
                    seek,
                    wanted_last,
                    first_index,
                    archived_end = index.end(),
                    "No archive unit owns requested index"
                );
                return Err(Error::InvariantViolation(format!(
                    "index {} is below first_index {} but no archive unit owns it",
                    seek, first_index
                )));
            }
        }
    }

    blocks.sort_by_key(|b| b.id);
    blocks.dedup_by_key(|b| b.id);

    let archived_blocks = delegations
        .into_values()
        .map(|(unit, ranges)| {
            let ranges = merge_ranges(ranges);
            let start = ranges.iter().map(|r| r.start).min().unwrap_or(0);
            let end = ranges.iter().map(BlockRange::end).max().unwrap_or(start);
            ArchivedRange {
                unit,
                ranges,
                start,
                length: end - start,
            }
        })
        .collect();

    Ok(GetBlocksResult {
        log_length,
        first_index,
        blocks,
        archived_blocks,
    })
}

/// Sort and join overlapping or touching ranges
fn merge_ranges(mut ranges: Vec<BlockRange>) -> Vec<BlockRange> {
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<BlockRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(prev) if range.start <= prev.end() => {
                prev.length = prev.end().max(range.end()) - prev.start;
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    /// `n` blocks, the oldest `archived` of them moved to units of `per_unit`
    fn fixture(n: u64, archived: u64, per_unit: u64) -> (LedgerStore, ArchiveIndex, Vec<UnitId>) {
        let mut store = LedgerStore::new();
        for i in 0..n {
            store.append(Value::Nat(i), None);
        }
        store.drain_front(archived).unwrap();

        let mut index = ArchiveIndex::new();
        let mut units = Vec::new();
        let mut start = 0;
        while start < archived {
            let unit = UnitId::generate();
            let count = per_unit.min(archived - start);
            index.register(unit, start).unwrap();
            index.extend(&unit, count, count == per_unit).unwrap();
            units.push(unit);
            start += count;
        }
        (store, index, units)
    }

    #[test]
    fn test_live_and_archived_split() {
        let (store, index, units) = fixture(5, 3, 10);

        let result = plan_range(&store, &index, &[BlockRange::new(0, 5)]).unwrap();

        assert_eq!(result.log_length, 5);
        assert_eq!(result.first_index, 3);
        let ids: Vec<u64> = result.blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(
            result.archived_blocks,
            vec![ArchivedRange {
                unit: units[0],
                ranges: vec![BlockRange::new(0, 3)],
                start: 0,
                length: 3,
            }]
        );
    }

    #[test]
    fn test_window_spanning_units() {
        let (store, index, units) = fixture(30, 25, 10);

        let result = plan_range(&store, &index, &[BlockRange::new(5, 22)]).unwrap();

        let spans: Vec<(UnitId, u64, u64)> = result
            .archived_blocks
            .iter()
            .map(|d| (d.unit, d.start, d.length))
            .collect();
        assert_eq!(
            spans,
            vec![(units[0], 5, 5), (units[1], 10, 10), (units[2], 20, 5)]
        );
        let ids: Vec<u64> = result.blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![25, 26]);
    }

    #[test]
    fn test_same_unit_ranges_coalesced() {
        let (store, index, units) = fixture(12, 10, 10);

        let result = plan_range(
            &store,
            &index,
            &[BlockRange::new(6, 2), BlockRange::new(1, 2)],
        )
        .unwrap();

        assert_eq!(result.archived_blocks.len(), 1);
        let d = &result.archived_blocks[0];
        assert_eq!(d.unit, units[0]);
        assert_eq!(d.ranges, vec![BlockRange::new(1, 2), BlockRange::new(6, 2)]);
        assert_eq!((d.start, d.length), (1, 7));
    }

    #[test]
    fn test_overlapping_requests_return_each_block_once() {
        let (store, index, units) = fixture(12, 8, 10);

        let result = plan_range(
            &store,
            &index,
            &[
                BlockRange::new(9, 3),
                BlockRange::new(2, 4),
                BlockRange::new(4, 6),
                BlockRange::new(8, 2),
            ],
        )
        .unwrap();

        let ids: Vec<u64> = result.blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![8, 9, 10, 11]);
        assert_eq!(
            result.archived_blocks,
            vec![ArchivedRange {
                unit: units[0],
                ranges: vec![BlockRange::new(2, 6)],
                start: 2,
                length: 6,
            }]
        );
    }

    #[test]
    fn test_merge_ranges_keeps_gaps() {
        let merged = merge_ranges(vec![
            BlockRange::new(7, 1),
            BlockRange::new(0, 2),
            BlockRange::new(2, 1),
            BlockRange::new(5, 1),
        ]);
        assert_eq!(
            merged,
            vec![
                BlockRange::new(0, 3),
                BlockRange::new(5, 1),
                BlockRange::new(7, 1)
            ]
        );
    }

    #[test]
    fn test_zero_length_and_out_of_range_requests() {
        let (store, index, _) = fixture(5, 3, 10);

        let result = plan_range(
            &store,
            &index,
            &[BlockRange::new(0, 0), BlockRange::new(50, 10)],
        )
        .unwrap();

        assert!(result.blocks.is_empty());
        assert!(result.archived_blocks.is_empty());
        assert_eq!(result.log_length, 5);
    }

    #[test]
    fn test_empty_ledger() {
        let result = plan_range(
            &LedgerStore::new(),
            &ArchiveIndex::new(),
            &[BlockRange::new(0, 10)],
        )
        .unwrap();
        assert_eq!(result.log_length, 0);
        assert!(result.blocks.is_empty());
    }

    #[test]
    fn test_unowned_archived_index_is_invariant_violation() {
        let (store, _, _) = fixture(5, 3, 10);

        let result = plan_range(&store, &ArchiveIndex::new(), &[BlockRange::new(1, 1)]);
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_unit_boundary_inclusive_end() {
        // Unit 0 owns [0, 9]; a window of exactly that must not touch unit 1.
        let (store, index, units) = fixture(25, 20, 10);

        let result = plan_range(&store, &index, &[BlockRange::new(0, 10)]).unwrap();
        assert_eq!(result.archived_blocks.len(), 1);
        assert_eq!(result.archived_blocks[0].unit, units[0]);

        let result = plan_range(&store, &index, &[BlockRange::new(9, 2)]).unwrap();
        let spans: Vec<(u64, u64)> = result
            .archived_blocks
            .iter()
            .map(|d| (d.start, d.length))
            .collect();
        assert_eq!(spans, vec![(9, 1), (10, 1)]);
    }
}
