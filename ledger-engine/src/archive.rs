//! Archive units and the archive index
//!
//! Archive units are independent storage services that hold contiguous
//! slices of old blocks. The engine only records which unit owns which
//! range ([`ArchiveIndex`]); it never owns the units themselves and reaches
//! them through a [`UnitProvisioner`].

use crate::{
    types::{ArchiveInfo, BlockRange, BlockWithId, UnitId, Value},
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Successful transfer outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    /// Blocks stored, unit has room left
    Accepted,
    /// Blocks stored, unit is now full
    AcceptedFull,
}

/// A satellite storage unit
///
/// An `Err` from [`transfer`](ArchiveUnit::transfer) means the unit rejected
/// the batch or could not be reached; nothing was stored.
#[async_trait]
pub trait ArchiveUnit: Send + Sync {
    /// Unit address
    fn id(&self) -> UnitId;

    /// Store blocks at the end of the unit's range
    async fn transfer(&self, blocks: Vec<Value>) -> Result<TransferOutcome>;

    /// Blocks the unit holds in the requested ranges
    async fn get_range(&self, ranges: &[BlockRange]) -> Result<Vec<BlockWithId>>;

    /// Number of blocks the unit can still accept
    async fn remaining_capacity(&self) -> Result<u64>;
}

/// Capability to create, fund and look up archive units
#[async_trait]
pub trait UnitProvisioner: Send + Sync {
    /// Budget available for funding new units
    async fn available_budget(&self) -> Result<u64>;

    /// Create and fund a unit whose first block will have index `start`
    async fn provision(
        &self,
        start: u64,
        capacity: u64,
        funding: u64,
    ) -> Result<Arc<dyn ArchiveUnit>>;

    /// Grant control of a unit to the given identities
    async fn set_controllers(&self, unit: UnitId, controllers: &[String]) -> Result<()>;

    /// Resolve a unit address
    fn unit(&self, id: &UnitId) -> Option<Arc<dyn ArchiveUnit>>;
}

/// Range owned by one archive unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRange {
    /// Owning unit
    pub unit: UnitId,
    /// First index owned
    pub start: u64,
    /// Number of blocks owned
    pub length: u64,
    /// Unit reported itself full; no further blocks go there
    pub full: bool,
}

impl ArchiveRange {
    /// Inclusive last index, `None` while empty
    pub fn last(&self) -> Option<u64> {
        (self.start + self.length).checked_sub(1).filter(|_| self.length > 0)
    }

    /// Exclusive end
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// Unit address → owned range, ordered by start
///
/// Ranges are contiguous from index 0 and only ever grow at the newest unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveIndex {
    ranges: BTreeMap<u64, ArchiveRange>,
}

impl ArchiveIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted ranges, checking contiguity
    pub fn from_ranges(ranges: Vec<ArchiveRange>) -> Result<Self> {
        let mut index = Self::new();
        for range in ranges {
            let length = range.length;
            let full = range.full;
            index.register(range.unit, range.start)?;
            index.extend(&range.unit, length, full)?;
        }
        Ok(index)
    }

    /// Number of units
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// No units yet
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// One past the newest archived index
    pub fn end(&self) -> u64 {
        self.latest().map(ArchiveRange::end).unwrap_or(0)
    }

    /// Most recently created unit
    pub fn latest(&self) -> Option<&ArchiveRange> {
        self.ranges.values().next_back()
    }

    /// Whether a unit is known
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.ranges.values().any(|r| r.unit == *unit)
    }

    /// Ranges ordered by start
    pub fn iter(&self) -> impl Iterator<Item = &ArchiveRange> {
        self.ranges.values()
    }

    /// Register a new unit starting at the current end of archived space
    pub fn register(&mut self, unit: UnitId, start: u64) -> Result<()> {
        if start != self.end() {
            return Err(Error::InvariantViolation(format!(
                "unit {} would start at {} but archived space ends at {}",
                unit,
                start,
                self.end()
            )));
        }
        if self.contains(&unit) {
            return Err(Error::InvariantViolation(format!(
                "unit {} registered twice",
                unit
            )));
        }
        if self.latest().is_some_and(|r| r.length == 0) {
            return Err(Error::InvariantViolation(
                "newest unit is still empty".to_string(),
            ));
        }
        self.ranges.insert(
            start,
            ArchiveRange {
                unit,
                start,
                length: 0,
                full: false,
            },
        );
        Ok(())
    }

    /// Grow the newest unit's range
    pub fn extend(&mut self, unit: &UnitId, count: u64, full: bool) -> Result<()> {
        let latest = self
            .ranges
            .values_mut()
            .next_back()
            .filter(|r| r.unit == *unit)
            .ok_or_else(|| {
                Error::InvariantViolation(format!("unit {} is not the newest unit", unit))
            })?;
        latest.length += count;
        latest.full |= full;
        Ok(())
    }

    /// Public listing, starting at and including `from` when given
    pub fn units_from(&self, from: Option<&UnitId>) -> Vec<ArchiveInfo> {
        let skip = match from {
            Some(unit) => match self.ranges.values().position(|r| r.unit == *unit) {
                Some(pos) => pos,
                None => return Vec::new(),
            },
            None => 0,
        };

        self.ranges
            .values()
            .skip(skip)
            .map(|r| ArchiveInfo {
                unit: r.unit,
                start: r.start,
                end: r.end(),
            })
            .collect()
    }

    /// Snapshot of all ranges
    pub fn to_ranges(&self) -> Vec<ArchiveRange> {
        self.ranges.values().cloned().collect()
    }
}

/// In-process archive unit
#[derive(Debug)]
pub struct MemoryArchive {
    id: UnitId,
    start: u64,
    capacity: u64,
    blocks: Mutex<Vec<Value>>,
    reject: Arc<AtomicBool>,
}

impl MemoryArchive {
    /// Create a unit whose first block has index `start`
    pub fn new(start: u64, capacity: u64) -> Self {
        Self::with_reject_flag(start, capacity, Arc::new(AtomicBool::new(false)))
    }

    fn with_reject_flag(start: u64, capacity: u64, reject: Arc<AtomicBool>) -> Self {
        Self {
            id: UnitId::generate(),
            start,
            capacity,
            blocks: Mutex::new(Vec::new()),
            reject,
        }
    }

    /// Number of stored blocks
    pub fn len(&self) -> u64 {
        self.blocks.lock().len() as u64
    }

    /// Whether nothing is stored yet
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// First index held by this unit
    pub fn start(&self) -> u64 {
        self.start
    }
}

#[async_trait]
impl ArchiveUnit for MemoryArchive {
    fn id(&self) -> UnitId {
        self.id
    }

    async fn transfer(&self, blocks: Vec<Value>) -> Result<TransferOutcome> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::TransferRejected(format!("unit {} unavailable", self.id)));
        }

        let mut stored = self.blocks.lock();
        let room = self.capacity - stored.len() as u64;
        if blocks.len() as u64 > room {
            return Err(Error::TransferRejected(format!(
                "unit {} has room for {} blocks, got {}",
                self.id,
                room,
                blocks.len()
            )));
        }
        stored.extend(blocks);

        if stored.len() as u64 == self.capacity {
            Ok(TransferOutcome::AcceptedFull)
        } else {
            Ok(TransferOutcome::Accepted)
        }
    }

    async fn get_range(&self, ranges: &[BlockRange]) -> Result<Vec<BlockWithId>> {
        let stored = self.blocks.lock();
        let end = self.start + stored.len() as u64;

        let mut out = Vec::new();
        for range in ranges {
            for id in range.start.max(self.start)..range.end().min(end) {
                out.push(BlockWithId {
                    id,
                    block: stored[(id - self.start) as usize].clone(),
                });
            }
        }
        Ok(out)
    }

    async fn remaining_capacity(&self) -> Result<u64> {
        Ok(self.capacity - self.len())
    }
}

/// In-process provisioner with a finite funding budget
#[derive(Debug)]
pub struct MemoryProvisioner {
    budget: Mutex<u64>,
    units: Mutex<Vec<Arc<MemoryArchive>>>,
    controllers: Mutex<HashMap<UnitId, Vec<String>>>,
    reject_transfers: Arc<AtomicBool>,
}

impl MemoryProvisioner {
    /// Create with a funding budget
    pub fn new(budget: u64) -> Self {
        Self {
            budget: Mutex::new(budget),
            units: Mutex::new(Vec::new()),
            controllers: Mutex::new(HashMap::new()),
            reject_transfers: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the remaining budget
    pub fn set_budget(&self, budget: u64) {
        *self.budget.lock() = budget;
    }

    /// Make every unit reject (or accept again) transfers
    pub fn set_reject_transfers(&self, reject: bool) {
        self.reject_transfers.store(reject, Ordering::SeqCst);
    }

    /// Units created so far, oldest first
    pub fn units(&self) -> Vec<Arc<MemoryArchive>> {
        self.units.lock().clone()
    }

    /// Controllers granted on a unit
    pub fn controllers_of(&self, unit: &UnitId) -> Vec<String> {
        self.controllers
            .lock()
            .get(unit)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl UnitProvisioner for MemoryProvisioner {
    async fn available_budget(&self) -> Result<u64> {
        Ok(*self.budget.lock())
    }

    async fn provision(
        &self,
        start: u64,
        capacity: u64,
        funding: u64,
    ) -> Result<Arc<dyn ArchiveUnit>> {
        {
            let mut budget = self.budget.lock();
            if *budget < funding {
                return Err(Error::InsufficientBudget {
                    required: funding,
                    available: *budget,
                });
            }
            *budget -= funding;
        }

        let unit = Arc::new(MemoryArchive::with_reject_flag(
            start,
            capacity,
            self.reject_transfers.clone(),
        ));
        self.units.lock().push(unit.clone());

        tracing::info!(unit = %unit.id(), start, capacity, "Archive unit provisioned");
        Ok(unit)
    }

    async fn set_controllers(&self, unit: UnitId, controllers: &[String]) -> Result<()> {
        self.controllers.lock().insert(unit, controllers.to_vec());
        Ok(())
    }

    fn unit(&self, id: &UnitId) -> Option<Arc<dyn ArchiveUnit>> {
        self.units
            .lock()
            .iter()
            .find(|u| u.id() == *id)
            .map(|u| u.clone() as Arc<dyn ArchiveUnit>)
    }
}
