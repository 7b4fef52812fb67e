//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Representation-independent hashing (see [`crate::crypto`])
//! - Memory safety (no unsafe code)

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 32-byte SHA-256 block hash
pub type BlockHash = [u8; 32];

/// Map key holding the caller record inside a block
pub const TX_KEY: &str = "tx";

/// Map key holding the parent block hash
pub const PHASH_KEY: &str = "phash";

/// Self-describing ledger value
///
/// Records, blocks and anything certified are expressed as a `Value`.
/// Map keys are unique; entry order carries no meaning for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Unsigned integer
    Nat(u64),
    /// Signed integer
    Int(i64),
    /// Byte string
    Blob(#[serde(with = "serde_bytes")] Vec<u8>),
    /// UTF-8 text
    Text(String),
    /// Ordered list
    Array(Vec<Value>),
    /// Association list with unique keys
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Empty map value
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    /// Text shorthand
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Borrow map entries if this is a map
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries.as_slice()),
            _ => None,
        }
    }

    /// Borrow bytes if this is a blob
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    /// Look up a map entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or replace a map entry. No-op on non-map values.
    pub fn map_insert(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Map(entries) = self {
            let key = key.into();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
    }

    /// Parent hash stored in a block, if any
    pub fn parent_hash(&self) -> Option<BlockHash> {
        self.get(PHASH_KEY)?.as_blob()?.try_into().ok()
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = crate::Error;

    fn try_from(json: serde_json::Value) -> crate::Result<Self> {
        use serde_json::Value as Json;

        Ok(match json {
            Json::Null => Value::empty_map(),
            Json::Bool(b) => Value::Nat(b as u64),
            Json::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Value::Nat(u)
                } else if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    return Err(crate::Error::InvalidValue(format!(
                        "floating point number {} has no ledger representation",
                        n
                    )));
                }
            }
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<crate::Result<_>>()?,
            ),
            Json::Object(fields) => {
                let mut map = Value::empty_map();
                for (k, v) in fields {
                    map.map_insert(k, Value::try_from(v)?);
                }
                map
            }
        })
    }
}

/// Address of an archive unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Fresh random unit address
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open index window `[start, start + length)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    /// First index
    pub start: u64,
    /// Number of indices
    pub length: u64,
}

impl BlockRange {
    /// Create a range
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Exclusive end, saturating at `u64::MAX`
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }
}

/// Block together with its absolute index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWithId {
    /// Absolute index
    pub id: u64,
    /// Block value
    pub block: Value,
}

/// Delegation to an archive unit for blocks no longer held live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRange {
    /// Owning archive unit
    pub unit: UnitId,
    /// Sub-ranges to request from the unit, ordered by start
    pub ranges: Vec<BlockRange>,
    /// Lowest index covered by `ranges`
    pub start: u64,
    /// Span from `start` to the end of the last range
    pub length: u64,
}

/// Answer to a range query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlocksResult {
    /// Total number of blocks ever appended
    pub log_length: u64,
    /// Oldest index still held live
    pub first_index: u64,
    /// Blocks served from the live store
    pub blocks: Vec<BlockWithId>,
    /// Follow-up calls needed for archived blocks
    pub archived_blocks: Vec<ArchivedRange>,
}

/// Public description of an archive unit. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Unit address
    pub unit: UnitId,
    /// First index owned
    pub start: u64,
    /// One past the last index owned
    pub end: u64,
}

/// Declared block type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTypeDescriptor {
    /// Type tag (e.g. `"1xfer"`)
    pub block_type: String,
    /// Documentation URL
    pub url: String,
}

/// Host certificate plus witness for the tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipCertificate {
    /// Certificate bytes produced by the certificate store
    #[serde(with = "serde_bytes")]
    pub certificate: Vec<u8>,
    /// Encoded hash tree witness covering both tip leaves
    #[serde(with = "serde_bytes")]
    pub witness: Vec<u8>,
}

/// Tip leaves plus witness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    /// LEB128-encoded last block index
    #[serde(with = "serde_bytes")]
    pub last_block_index: Vec<u8>,
    /// Hash of the last block
    pub last_block_hash: BlockHash,
    /// Encoded hash tree witness
    #[serde(with = "serde_bytes")]
    pub witness: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_insert_replaces_existing_key() {
        let mut map = Value::empty_map();
        map.map_insert("a", Value::Nat(1));
        map.map_insert("b", Value::Nat(2));
        map.map_insert("a", Value::Nat(3));

        assert_eq!(map.as_map().unwrap().len(), 2);
        assert_eq!(map.get("a"), Some(&Value::Nat(3)));
    }

    #[test]
    fn test_map_insert_ignores_non_maps() {
        let mut v = Value::Nat(7);
        v.map_insert("a", Value::Nat(1));
        assert_eq!(v, Value::Nat(7));
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({
            "op": "xfer",
            "amt": 100,
            "delta": -5,
            "memo": [1, 2]
        });
        let value = Value::try_from(json).unwrap();

        assert_eq!(value.get("op"), Some(&Value::text("xfer")));
        assert_eq!(value.get("amt"), Some(&Value::Nat(100)));
        assert_eq!(value.get("delta"), Some(&Value::Int(-5)));
        assert_eq!(
            value.get("memo"),
            Some(&Value::Array(vec![Value::Nat(1), Value::Nat(2)]))
        );
    }

    #[test]
    fn test_from_json_rejects_floats() {
        let result = Value::try_from(serde_json::json!(1.5));
        assert!(matches!(result, Err(crate::Error::InvalidValue(_))));
    }

    #[test]
    fn test_block_range_end_saturates() {
        assert_eq!(BlockRange::new(10, 5).end(), 15);
        assert_eq!(BlockRange::new(u64::MAX - 1, 5).end(), u64::MAX);
    }
}
