//! Archive migration state machine
//!
//! A pass is split in three steps so the actor never awaits while holding
//! ledger state:
//!
//! ```text
//!   Idle ──plan()──► Migrating ──run_pass().await──► apply() ──► Idle
//!          (actor)               (spawned task)       (actor)
//! ```
//!
//! - [`plan`] decides the destination and snapshots the oldest blocks.
//! - [`run_pass`] provisions a unit if needed and transfers the batch.
//! - [`apply`] drops the transferred blocks and grows the archive index, but
//!   only once the unit acknowledged them. A failed pass changes nothing.

use crate::{
    archive::{ArchiveIndex, ArchiveUnit, TransferOutcome, UnitProvisioner},
    config::Settings,
    store::LedgerStore,
    types::{UnitId, Value},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// No pass in flight
    Idle,
    /// A pass is awaiting its unit
    Migrating,
}

/// Unit provisioned by a failed pass, kept for the next one
///
/// A unit is told its first index when it is provisioned, so it can only be
/// registered while the live store still starts there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUnit {
    /// Unit address
    pub unit: UnitId,
    /// Index the unit was provisioned to start at
    pub start: u64,
}

/// Where the next batch goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Newest registered unit, which still has room
    Existing {
        /// Unit address
        unit: UnitId,
        /// Room left according to the index
        remaining: u64,
    },
    /// Unit provisioned by an earlier failed pass but never registered
    Pending {
        /// Unit address
        unit: UnitId,
    },
    /// A unit must be provisioned first
    New,
}

/// Work decided by [`plan`]
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Destination unit
    pub destination: Destination,
    /// Index of the first block in `blocks`
    pub start: u64,
    /// Oldest live blocks, in order
    pub blocks: Vec<Value>,
    /// Capacity given to a new unit
    pub unit_capacity: u64,
    /// Funding given to a new unit
    pub funding: u64,
    /// Controllers granted on a new unit
    pub controllers: Vec<String>,
}

/// Result of [`run_pass`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Unit created during this pass, if any
    pub provisioned: Option<UnitId>,
    /// What happened to the batch
    pub outcome: PassOutcome,
}

/// Batch outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The unit acknowledged `count` blocks starting at `start`
    Transferred {
        /// Destination unit
        unit: UnitId,
        /// Index of the first transferred block
        start: u64,
        /// Number of blocks stored
        count: u64,
        /// Unit is now full
        full: bool,
    },
    /// Nothing was stored
    Failed {
        /// Human-readable cause
        reason: String,
    },
}

impl MigrationReport {
    /// Report for a pass that stored nothing
    pub fn failed(provisioned: Option<UnitId>, reason: impl Into<String>) -> Self {
        Self {
            provisioned,
            outcome: PassOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Decide the next pass. `Ok(None)` means there is nothing to do.
pub fn plan(
    store: &LedgerStore,
    index: &ArchiveIndex,
    pending_unit: Option<PendingUnit>,
    settings: &Settings,
) -> Result<Option<MigrationPlan>> {
    settings.validate()?;

    let live = store.live_len();
    if live < settings.max_active_records {
        return Ok(None);
    }

    let first_index = store.first_index();
    let pending = pending_unit.filter(|p| {
        if p.start != first_index {
            tracing::warn!(
                unit = %p.unit,
                provisioned_start = p.start,
                first_index,
                "Ignoring pending archive unit provisioned for another start"
            );
        }
        p.start == first_index
    });

    // Pending unit first: its start was fixed when it was provisioned.
    let capacity = settings.max_records_in_archive_instance;
    let destination = match (pending, index.latest()) {
        (Some(p), _) => Destination::Pending { unit: p.unit },
        (None, Some(latest)) if !latest.full && latest.length < capacity => {
            Destination::Existing {
                unit: latest.unit,
                remaining: capacity - latest.length,
            }
        }
        _ => Destination::New,
    };
    let room = match &destination {
        Destination::Existing { remaining, .. } => *remaining,
        Destination::Pending { .. } | Destination::New => capacity,
    };

    let batch = live
        .saturating_sub(settings.settle_to_records)
        .min(room)
        .min(settings.max_records_to_archive);
    if batch == 0 {
        return Ok(None);
    }

    Ok(Some(MigrationPlan {
        destination,
        start: first_index,
        blocks: store.oldest(batch),
        unit_capacity: capacity,
        funding: settings.archive_funding,
        controllers: settings.controllers.clone(),
    }))
}

/// Execute a planned pass against the collaborators. Never panics on
/// collaborator failure; every error becomes a `Failed` report.
pub async fn run_pass(plan: MigrationPlan, provisioner: Arc<dyn UnitProvisioner>) -> MigrationReport {
    let MigrationPlan {
        destination,
        start,
        mut blocks,
        unit_capacity,
        funding,
        controllers,
    } = plan;

    let (unit, provisioned) = match destination {
        Destination::Existing { unit, .. } | Destination::Pending { unit } => {
            match provisioner.unit(&unit) {
                Some(handle) => (handle, None),
                None => {
                    return MigrationReport::failed(None, format!("unit {} is unreachable", unit))
                }
            }
        }
        Destination::New => {
            match provision(&*provisioner, start, unit_capacity, funding, &controllers).await {
                Ok(handle) => {
                    let id = handle.id();
                    (handle, Some(id))
                }
                Err(e) => return MigrationReport::failed(None, e.to_string()),
            }
        }
    };
    let unit_id = unit.id();

    let room = match unit.remaining_capacity().await {
        Ok(room) => room,
        Err(e) => return MigrationReport::failed(provisioned, e.to_string()),
    };
    if room == 0 {
        // Unit filled up behind our back; close its range and move on.
        return MigrationReport {
            provisioned,
            outcome: PassOutcome::Transferred {
                unit: unit_id,
                start,
                count: 0,
                full: true,
            },
        };
    }
    blocks.truncate(room.min(blocks.len() as u64) as usize);
    let count = blocks.len() as u64;

    tracing::info!(unit = %unit_id, start, count, "Transferring blocks to archive");

    match unit.transfer(blocks).await {
        Ok(outcome) => MigrationReport {
            provisioned,
            outcome: PassOutcome::Transferred {
                unit: unit_id,
                start,
                count,
                full: outcome == TransferOutcome::AcceptedFull,
            },
        },
        Err(e) => MigrationReport::failed(provisioned, e.to_string()),
    }
}

async fn provision(
    provisioner: &dyn UnitProvisioner,
    start: u64,
    capacity: u64,
    funding: u64,
    controllers: &[String],
) -> Result<Arc<dyn ArchiveUnit>> {
    // Check-then-act: the budget may drain between the check and the call.
    let available = provisioner.available_budget().await?;
    if available < funding {
        return Err(Error::InsufficientBudget {
            required: funding,
            available,
        });
    }

    let unit = provisioner.provision(start, capacity, funding).await?;
    if let Err(e) = provisioner.set_controllers(unit.id(), controllers).await {
        tracing::warn!(unit = %unit.id(), error = %e, "Failed to set archive unit controllers");
    }
    Ok(unit)
}

/// Fold a report into ledger state. Returns the unit to remember as pending.
pub fn apply(
    report: MigrationReport,
    store: &mut LedgerStore,
    index: &mut ArchiveIndex,
    pending_unit: Option<PendingUnit>,
) -> Result<Option<PendingUnit>> {
    match report.outcome {
        PassOutcome::Transferred {
            unit,
            start,
            count,
            full,
        } => {
            if start != store.first_index() {
                return Err(Error::InvariantViolation(format!(
                    "transfer started at {} but live store starts at {}",
                    start,
                    store.first_index()
                )));
            }
            if !index.contains(&unit) {
                if count == 0 {
                    // Never-used unit reported full: forget it.
                    return Ok(None);
                }
                index.register(unit, start)?;
            }
            store.drain_front(count)?;
            index.extend(&unit, count, full)?;

            tracing::info!(
                unit = %unit,
                count,
                full,
                first_index = store.first_index(),
                "Blocks archived"
            );
            if let Some(stale) = pending_unit.filter(|p| p.unit != unit) {
                tracing::warn!(unit = %stale.unit, "Abandoning pending archive unit");
            }
            Ok(None)
        }
        PassOutcome::Failed { reason } => {
            tracing::warn!(reason = %reason, "Archive migration made no progress");
            let start = store.first_index();
            Ok(report
                .provisioned
                .map(|unit| PendingUnit { unit, start })
                .or(pending_unit.filter(|p| p.start == start)))
        }
    }
}
