//! Live block store
//!
//! Holds the contiguous tail of the log that has not been archived yet,
//! plus the index bookkeeping shared with archive units:
//!
//! - `first_index` - index of the oldest live block
//! - `log_length` - `first_index + live_len`, one past the newest index
//! - `latest_hash` - hash of the newest block ever committed
//!
//! Blocks below `first_index` live only in archive units.

use crate::{
    crypto::hash_value,
    error::{Error, Result},
    types::{BlockHash, BlockWithId, Value, PHASH_KEY, TX_KEY},
};
use std::collections::VecDeque;

/// Build a block from a record, optional extra top-level fields and the parent hash
///
/// Extra fields that are not a map are ignored. Extra entries never override
/// the chaining keys `tx` and `phash`.
pub fn build_block(record: Value, extra: Option<Value>, parent: Option<BlockHash>) -> Value {
    let mut block = Value::empty_map();
    if let Some(parent) = parent {
        block.map_insert(PHASH_KEY, Value::Blob(parent.to_vec()));
    }
    block.map_insert(TX_KEY, record);

    match extra {
        Some(Value::Map(entries)) => {
            for (key, value) in entries {
                if key == TX_KEY || key == PHASH_KEY {
                    tracing::warn!(key = %key, "Ignoring extra field that shadows a chaining key");
                    continue;
                }
                block.map_insert(key, value);
            }
        }
        Some(other) => {
            tracing::debug!(?other, "Ignoring non-map extra fields");
        }
        None => {}
    }

    block
}

/// In-memory live store
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    blocks: VecDeque<Value>,
    first_index: u64,
    latest_hash: Option<BlockHash>,
}

impl LedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted parts, checking the hash chain
    pub fn from_parts(
        blocks: Vec<Value>,
        first_index: u64,
        latest_hash: Option<BlockHash>,
    ) -> Result<Self> {
        let store = Self {
            blocks: blocks.into(),
            first_index,
            latest_hash,
        };
        store.verify_chain()?;
        Ok(store)
    }

    /// Append a record, returning its index and the new tip hash
    pub fn append(&mut self, record: Value, extra: Option<Value>) -> (u64, BlockHash) {
        let block = build_block(record, extra, self.latest_hash);
        let hash = hash_value(&block);
        let index = self.log_length();

        self.blocks.push_back(block);
        self.latest_hash = Some(hash);

        tracing::debug!(index, live = self.blocks.len(), "Block appended");

        (index, hash)
    }

    /// Index of the oldest live block
    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Total number of blocks ever appended (live and archived)
    pub fn log_length(&self) -> u64 {
        self.first_index + self.blocks.len() as u64
    }

    /// Index of the newest block, `None` while nothing was ever appended
    pub fn last_index(&self) -> Option<u64> {
        self.log_length().checked_sub(1)
    }

    /// Number of live blocks
    pub fn live_len(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Hash of the newest block
    pub fn latest_hash(&self) -> Option<BlockHash> {
        self.latest_hash
    }

    /// Live block by absolute index
    pub fn get(&self, index: u64) -> Option<&Value> {
        let offset = index.checked_sub(self.first_index)?;
        self.blocks.get(usize::try_from(offset).ok()?)
    }

    /// Live blocks in `[start, end)`, clamped to the live window
    pub fn range(&self, start: u64, end: u64) -> Vec<BlockWithId> {
        let start = start.max(self.first_index);
        let end = end.min(self.log_length());
        (start..end)
            .filter_map(|id| {
                self.get(id).map(|block| BlockWithId {
                    id,
                    block: block.clone(),
                })
            })
            .collect()
    }

    /// Copy of the `count` oldest live blocks
    pub fn oldest(&self, count: u64) -> Vec<Value> {
        self.blocks
            .iter()
            .take(count as usize)
            .cloned()
            .collect()
    }

    /// Drop the `count` oldest blocks once an archive unit holds them
    pub fn drain_front(&mut self, count: u64) -> Result<()> {
        if count > self.live_len() {
            return Err(Error::InvariantViolation(format!(
                "cannot drop {} blocks from a live store of {}",
                count,
                self.live_len()
            )));
        }
        self.blocks.drain(..count as usize);
        self.first_index += count;
        Ok(())
    }

    /// Iterate live blocks in index order
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.blocks.iter()
    }

    /// Check that every live block links to its predecessor and the tip hash matches
    pub fn verify_chain(&self) -> Result<()> {
        let mut previous: Option<BlockHash> = None;
        for (offset, block) in self.blocks.iter().enumerate() {
            let index = self.first_index + offset as u64;
            if let Some(expected) = previous {
                if block.parent_hash() != Some(expected) {
                    return Err(Error::InvariantViolation(format!(
                        "block {} does not link to block {}",
                        index,
                        index - 1
                    )));
                }
            } else if index == 0 && block.get(PHASH_KEY).is_some() {
                return Err(Error::InvariantViolation(
                    "genesis block carries a parent hash".to_string(),
                ));
            }
            previous = Some(hash_value(block));
        }

        if previous.is_some() && previous != self.latest_hash {
            return Err(Error::InvariantViolation(
                "latest hash does not match the newest block".to_string(),
            ));
        }
        if self.log_length() == 0 && self.latest_hash.is_some() {
            return Err(Error::InvariantViolation(
                "empty ledger has a latest hash".to_string(),
            ));
        }
        Ok(())
    }
}
