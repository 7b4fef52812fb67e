//! Persisted engine state and schema upgrades
//!
//! State is stored as a [`VersionedState`]. Older layouts are converted by
//! [`VersionedState::upgrade`], a pure function that leaves blocks, indices,
//! hashes and archive ranges untouched.

use crate::{
    archive::{ArchiveIndex, ArchiveRange},
    config::Settings,
    migration::PendingUnit,
    store::LedgerStore,
    types::{BlockHash, BlockTypeDescriptor, UnitId, Value},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Current state layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Live blocks, oldest first
    pub blocks: Vec<Value>,
    /// Index of the oldest live block
    pub first_index: u64,
    /// Hash of the newest block
    pub latest_hash: Option<BlockHash>,
    /// Archive ranges ordered by start
    pub archives: Vec<ArchiveRange>,
    /// Provisioned unit not yet holding any block
    pub pending_unit: Option<PendingUnit>,
    /// Archiving settings
    pub settings: Settings,
    /// Declared block types
    pub block_types: Vec<BlockTypeDescriptor>,
    /// Engine owner
    pub owner: String,
    /// Activity counter: blocks appended since genesis
    pub blocks_appended: u64,
}

/// Validated state split into the pieces the engine runs on
#[derive(Debug)]
pub(crate) struct Restored {
    pub store: LedgerStore,
    pub index: ArchiveIndex,
    pub pending_unit: Option<PendingUnit>,
    pub settings: Settings,
    pub block_types: Vec<BlockTypeDescriptor>,
    pub owner: String,
    pub blocks_appended: u64,
}

impl LedgerState {
    /// Fresh state for an empty ledger
    pub fn new(owner: impl Into<String>, settings: Settings) -> Self {
        Self {
            blocks: Vec::new(),
            first_index: 0,
            latest_hash: None,
            archives: Vec::new(),
            pending_unit: None,
            settings,
            block_types: Vec::new(),
            owner: owner.into(),
            blocks_appended: 0,
        }
    }

    /// Total number of blocks, live and archived
    pub fn log_length(&self) -> u64 {
        self.first_index + self.blocks.len() as u64
    }

    /// Serialize as the current version
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&VersionedState::V2(self.clone()))?)
    }

    /// Deserialize any known version, upgrading and validating it
    pub fn decode(bytes: &[u8], owner: &str) -> Result<Self> {
        let versioned: VersionedState = bincode::deserialize(bytes)?;
        let state = versioned.upgrade(owner);
        state.check_invariants()?;
        Ok(state)
    }

    /// Check the hash chain, archive contiguity and the live/archive boundary
    pub fn check_invariants(&self) -> Result<()> {
        self.clone().restore().map(|_| ())
    }

    pub(crate) fn restore(self) -> Result<Restored> {
        self.settings.validate()?;
        let store = LedgerStore::from_parts(self.blocks, self.first_index, self.latest_hash)?;
        let index = ArchiveIndex::from_ranges(self.archives)?;

        if index.end() != store.first_index() {
            return Err(Error::InvariantViolation(format!(
                "archives end at {} but live blocks start at {}",
                index.end(),
                store.first_index()
            )));
        }
        if let Some(unit) = self
            .pending_unit
            .map(|p| p.unit)
            .filter(|u| index.contains(u))
        {
            return Err(Error::InvariantViolation(format!(
                "pending unit {} is already registered",
                unit
            )));
        }
        if store.log_length() > 0 && store.latest_hash().is_none() {
            return Err(Error::InvariantViolation(
                "non-empty ledger has no latest hash".to_string(),
            ));
        }

        Ok(Restored {
            store,
            index,
            pending_unit: self.pending_unit,
            settings: self.settings,
            block_types: self.block_types,
            owner: self.owner,
            blocks_appended: self.blocks_appended,
        })
    }
}

/// Legacy layout: inclusive archive ends, one batch setting, no owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateV1 {
    /// Live blocks, oldest first
    pub blocks: Vec<Value>,
    /// Index of the oldest live block
    pub first_index: u64,
    /// Hash of the newest block
    pub last_hash: Option<BlockHash>,
    /// `(unit, start, inclusive end)` ordered by start
    pub archives: Vec<(UnitId, u64, u64)>,
    /// High-water mark
    pub max_active_records: u64,
    /// Settle target
    pub settle_to_records: u64,
    /// Per-unit capacity
    pub max_records_in_archive_instance: u64,
    /// Per-pass batch cap
    pub max_archive_batch: u64,
}

/// Every persisted layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionedState {
    /// Legacy layout
    V1(StateV1),
    /// Current layout
    V2(LedgerState),
}

impl VersionedState {
    /// Convert to the current layout
    pub fn upgrade(self, owner: &str) -> LedgerState {
        match self {
            VersionedState::V1(v1) => upgrade_v1(v1, owner),
            VersionedState::V2(state) => state,
        }
    }
}

fn upgrade_v1(v1: StateV1, owner: &str) -> LedgerState {
    let capacity = v1.max_records_in_archive_instance;
    let archives = v1
        .archives
        .into_iter()
        .map(|(unit, start, last)| {
            let length = last.saturating_add(1).saturating_sub(start);
            ArchiveRange {
                unit,
                start,
                length,
                full: length >= capacity,
            }
        })
        .collect();

    LedgerState {
        first_index: v1.first_index,
        latest_hash: v1.last_hash,
        archives,
        pending_unit: None,
        settings: Settings {
            max_active_records: v1.max_active_records,
            settle_to_records: v1.settle_to_records,
            max_records_in_archive_instance: capacity,
            max_records_to_archive: v1.max_archive_batch,
            controllers: vec![owner.to_string()],
            ..Settings::default()
        },
        block_types: Vec::new(),
        owner: owner.to_string(),
        blocks_appended: v1.first_index + v1.blocks.len() as u64,
        blocks: v1.blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_fixture() -> (StateV1, LedgerStore, UnitId) {
        let mut store = LedgerStore::new();
        for i in 0..6 {
            store.append(Value::Nat(i), None);
        }
        store.drain_front(4).unwrap();
        let unit = UnitId::generate();

        let v1 = StateV1 {
            blocks: store.iter().cloned().collect(),
            first_index: 4,
            last_hash: store.latest_hash(),
            archives: vec![(unit, 0, 3)],
            max_active_records: 4,
            settle_to_records: 2,
            max_records_in_archive_instance: 4,
            max_archive_batch: 10,
        };
        (v1, store, unit)
    }

    #[test]
    fn test_upgrade_v1_preserves_chain_and_ranges() {
        let (v1, store, unit) = v1_fixture();

        let state = VersionedState::V1(v1.clone()).upgrade("alice");

        assert_eq!(state.blocks, v1.blocks);
        assert_eq!(state.first_index, 4);
        assert_eq!(state.latest_hash, store.latest_hash());
        assert_eq!(
            state.archives,
            vec![ArchiveRange {
                unit,
                start: 0,
                length: 4,
                full: true,
            }]
        );
        assert_eq!(state.settings.max_records_to_archive, 10);
        assert_eq!(state.settings.controllers, vec!["alice".to_string()]);
        assert_eq!(state.owner, "alice");
        assert_eq!(state.log_length(), 6);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_encode_decode_current() {
        let (v1, _, _) = v1_fixture();
        let state = VersionedState::V1(v1).upgrade("alice");

        let decoded = LedgerState::decode(&state.encode().unwrap(), "bob").unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_legacy_bytes() {
        let (v1, _, _) = v1_fixture();
        let bytes = bincode::serialize(&VersionedState::V1(v1)).unwrap();

        let state = LedgerState::decode(&bytes, "carol").unwrap();
        assert_eq!(state.owner, "carol");
        assert_eq!(state.archives[0].length, 4);
    }

    #[test]
    fn test_boundary_gap_rejected() {
        let (mut v1, _, _) = v1_fixture();
        v1.archives = vec![(UnitId::generate(), 0, 2)];

        let state = VersionedState::V1(v1).upgrade("alice");
        assert!(matches!(
            state.check_invariants(),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_tampered_block_rejected() {
        let (v1, _, _) = v1_fixture();
        let mut state = VersionedState::V1(v1).upgrade("alice");
        state.blocks[1] = Value::Nat(99);

        assert!(state.check_invariants().is_err());
    }
}
