//! Labeled Merkle hash tree for certified data
//!
//! The certified root binds a small set of labeled leaves. Witnesses are the
//! same tree with unrequested subtrees replaced by their hashes, so a verifier
//! can recompute the root from the witness alone.
//!
//! # Design
//!
//! - SHA-256 with a length-prefixed domain separator per node kind
//! - Leaves sorted by label, folded into a balanced binary tree
//! - Pruning keeps the digest stable

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashTree {
    /// Empty tree
    Empty,
    /// Binary fork
    Fork(Box<HashTree>, Box<HashTree>),
    /// Labeled subtree
    Labeled(#[serde(with = "serde_bytes")] Vec<u8>, Box<HashTree>),
    /// Leaf payload
    Leaf(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Subtree replaced by its digest
    Pruned([u8; 32]),
}

fn domain_hasher(sep: &str) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update([sep.len() as u8]);
    hasher.update(sep.as_bytes());
    hasher
}

impl HashTree {
    /// Build a tree from `(label, leaf)` pairs. Labels are sorted and must be unique.
    pub fn from_labeled_leaves(mut leaves: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        leaves.sort_by(|a, b| a.0.cmp(&b.0));
        leaves.dedup_by(|a, b| a.0 == b.0);
        Self::build(&leaves)
    }

    fn build(leaves: &[(Vec<u8>, Vec<u8>)]) -> Self {
        match leaves {
            [] => HashTree::Empty,
            [(label, leaf)] => {
                HashTree::Labeled(label.clone(), Box::new(HashTree::Leaf(leaf.clone())))
            }
            _ => {
                let (left, right) = leaves.split_at(leaves.len() / 2);
                HashTree::Fork(Box::new(Self::build(left)), Box::new(Self::build(right)))
            }
        }
    }

    /// Root digest
    pub fn digest(&self) -> [u8; 32] {
        match self {
            HashTree::Empty => domain_hasher("ic-hashtree-empty").finalize().into(),
            HashTree::Fork(left, right) => {
                let mut hasher = domain_hasher("ic-hashtree-fork");
                hasher.update(left.digest());
                hasher.update(right.digest());
                hasher.finalize().into()
            }
            HashTree::Labeled(label, subtree) => {
                let mut hasher = domain_hasher("ic-hashtree-labeled");
                hasher.update(label);
                hasher.update(subtree.digest());
                hasher.finalize().into()
            }
            HashTree::Leaf(bytes) => {
                let mut hasher = domain_hasher("ic-hashtree-leaf");
                hasher.update(bytes);
                hasher.finalize().into()
            }
            HashTree::Pruned(digest) => *digest,
        }
    }

    /// Witness revealing only the given labels
    pub fn witness(&self, labels: &[&[u8]]) -> HashTree {
        match self {
            HashTree::Empty => HashTree::Empty,
            HashTree::Fork(left, right) => {
                let left = left.witness(labels);
                let right = right.witness(labels);
                match (&left, &right) {
                    (HashTree::Pruned(_), HashTree::Pruned(_)) => HashTree::Pruned(self.digest()),
                    _ => HashTree::Fork(Box::new(left), Box::new(right)),
                }
            }
            HashTree::Labeled(label, _) if labels.contains(&label.as_slice()) => self.clone(),
            HashTree::Labeled(..) | HashTree::Leaf(_) | HashTree::Pruned(_) => {
                HashTree::Pruned(self.digest())
            }
        }
    }

    /// Leaf stored directly under `label`, if revealed
    pub fn lookup(&self, label: &[u8]) -> Option<&[u8]> {
        match self {
            HashTree::Fork(left, right) => left.lookup(label).or_else(|| right.lookup(label)),
            HashTree::Labeled(l, subtree) if l.as_slice() == label => match subtree.as_ref() {
                HashTree::Leaf(bytes) => Some(bytes.as_slice()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Wire encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from wire encoding
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::Other(format!("Malformed hash tree: {}", e)))
    }
}
