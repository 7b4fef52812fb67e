//! Certified Ledger Engine
//!
//! Append-only, hash-chained transaction log with a certified tip and
//! automatic migration of old blocks to archive units.
//!
//! # Architecture
//!
//! - **Hash chain**: every block embeds the hash of its predecessor
//! - **Single Writer**: one actor owns all ledger state
//! - **Certified tip**: last index and hash are bound into a Merkle root
//! - **Archiving**: blocks past the high-water mark move to archive units
//!
//! # Invariants
//!
//! - Indices are contiguous from 0 and never renumbered
//! - Archive ranges are disjoint and, with the live range, cover the log
//! - A block leaves the live store only after an archive unit accepted it

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod archive;
pub mod certification;
pub mod config;
pub mod crypto;
pub mod error;
pub mod leb128;
pub mod ledger;
pub mod listeners;
pub mod merkle;
pub mod metrics;
pub mod migration;
pub mod query;
pub mod state;
pub mod store;
pub mod types;

// Re-exports
pub use archive::{ArchiveUnit, UnitProvisioner};
pub use certification::CertificateStore;
pub use config::{Config, Setting, Settings};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use types::{
    ArchiveInfo, ArchivedRange, BlockRange, BlockWithId, GetBlocksResult, Tip, TipCertificate,
    UnitId, Value,
};
