//! Tip certification
//!
//! Every time the tip changes, the last block index (LEB128) and the last
//! block hash are written as two labeled leaves of a [`HashTree`] and its
//! root is handed to the [`CertificateStore`]. Readers get the store's
//! certificate plus a witness covering both leaves.

use crate::{
    crypto::{verify_signature, KeyPair},
    leb128,
    merkle::HashTree,
    types::{BlockHash, Tip, TipCertificate},
    Error, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Label of the LEB128-encoded last block index
pub const LAST_BLOCK_INDEX: &[u8] = b"last_block_index";

/// Label of the last block hash
pub const LAST_BLOCK_HASH: &[u8] = b"last_block_hash";

/// Host capability that certifies a 32-byte root
pub trait CertificateStore: Send + Sync {
    /// Commit a new root into the certified-data slot
    fn set_certified_data(&self, root: [u8; 32]);

    /// Certificate for the committed root, if the host produced one yet
    fn data_certificate(&self) -> Option<Vec<u8>>;
}

/// Tree holding both tip leaves
pub fn tip_tree(last_index: u64, last_hash: &BlockHash) -> HashTree {
    HashTree::from_labeled_leaves(vec![
        (LAST_BLOCK_INDEX.to_vec(), leb128::encode(last_index)),
        (LAST_BLOCK_HASH.to_vec(), last_hash.to_vec()),
    ])
}

/// Leaf stored under `label` in an encoded witness, `None` if pruned or absent
pub fn lookup_leaf(witness: &[u8], label: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(HashTree::decode(witness)?.lookup(label).map(<[u8]>::to_vec))
}

/// Read `(last_index, last_hash)` back out of an encoded witness
pub fn decode_tip_witness(witness: &[u8]) -> Result<(u64, BlockHash, [u8; 32])> {
    let tree = HashTree::decode(witness)?;
    let index = tree
        .lookup(LAST_BLOCK_INDEX)
        .ok_or_else(|| Error::Other("witness lacks last_block_index".to_string()))?;
    let hash = tree
        .lookup(LAST_BLOCK_HASH)
        .ok_or_else(|| Error::Other("witness lacks last_block_hash".to_string()))?;
    let hash: BlockHash = hash
        .try_into()
        .map_err(|_| Error::Other(format!("last_block_hash is {} bytes", hash.len())))?;

    Ok((leb128::decode(index)?, hash, tree.digest()))
}

/// Binds the ledger tip into certified data
#[derive(Default)]
pub struct Certifier {
    store: Option<Arc<dyn CertificateStore>>,
    tree: Option<HashTree>,
}

impl std::fmt::Debug for Certifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certifier")
            .field("configured", &self.store.is_some())
            .field("tree", &self.tree)
            .finish()
    }
}

impl Certifier {
    /// Create a certifier, optionally with a store
    pub fn new(store: Option<Arc<dyn CertificateStore>>) -> Self {
        Self { store, tree: None }
    }

    /// Whether a certificate store is configured
    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Attach a store and commit the current tree to it, if any
    pub fn set_store(&mut self, store: Arc<dyn CertificateStore>) {
        if let Some(tree) = &self.tree {
            store.set_certified_data(tree.digest());
        }
        self.store = Some(store);
    }

    /// Re-certify after the tip changed
    pub fn certify(&mut self, last_index: u64, last_hash: &BlockHash) {
        let tree = tip_tree(last_index, last_hash);
        if let Some(store) = &self.store {
            store.set_certified_data(tree.digest());
        }
        self.tree = Some(tree);
    }

    fn witness(tree: &HashTree) -> Result<Vec<u8>> {
        tree.witness(&[LAST_BLOCK_INDEX, LAST_BLOCK_HASH]).encode()
    }

    /// Certificate plus witness, or `None` when uncertified
    pub fn tip_certificate(&self) -> Result<Option<TipCertificate>> {
        let (Some(store), Some(tree)) = (&self.store, &self.tree) else {
            return Ok(None);
        };
        let Some(certificate) = store.data_certificate() else {
            return Ok(None);
        };

        Ok(Some(TipCertificate {
            certificate,
            witness: Self::witness(tree)?,
        }))
    }

    /// Tip leaves plus witness. Fails when no store is configured.
    pub fn tip(&self) -> Result<Tip> {
        if self.store.is_none() {
            return Err(Error::Uncertified(
                "no certificate store configured".to_string(),
            ));
        }
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| Error::Uncertified("ledger is empty".to_string()))?;

        let last_block_index = tree
            .lookup(LAST_BLOCK_INDEX)
            .ok_or_else(|| Error::InvariantViolation("tip tree lacks index leaf".to_string()))?
            .to_vec();
        let last_block_hash: BlockHash = tree
            .lookup(LAST_BLOCK_HASH)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| Error::InvariantViolation("tip tree lacks hash leaf".to_string()))?;

        Ok(Tip {
            last_block_index,
            last_block_hash,
            witness: Self::witness(tree)?,
        })
    }
}

#[derive(Debug, Default)]
struct LocalSlot {
    root: Option<[u8; 32]>,
    certificate: Option<Vec<u8>>,
}

/// In-process certificate store signing roots with Ed25519
///
/// Certificates are `root || signature`. In deferred mode a certificate only
/// appears after [`LocalCertifier::publish`], mimicking a host that certifies
/// at the end of a round.
#[derive(Debug)]
pub struct LocalCertifier {
    keypair: KeyPair,
    deferred: bool,
    slot: Mutex<LocalSlot>,
}

impl LocalCertifier {
    /// Certify immediately on every commit
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            keypair,
            deferred: false,
            slot: Mutex::new(LocalSlot::default()),
        }
    }

    /// Certify only when [`publish`](Self::publish) is called
    pub fn deferred(keypair: KeyPair) -> Self {
        Self {
            deferred: true,
            ..Self::new(keypair)
        }
    }

    /// Public key verifiers need
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// Sign the pending root
    pub fn publish(&self) {
        let mut slot = self.slot.lock();
        slot.certificate = slot.root.map(|root| self.sign_root(&root));
    }

    fn sign_root(&self, root: &[u8; 32]) -> Vec<u8> {
        let mut certificate = root.to_vec();
        certificate.extend_from_slice(&self.keypair.sign(root));
        certificate
    }
}

impl CertificateStore for LocalCertifier {
    fn set_certified_data(&self, root: [u8; 32]) {
        let mut slot = self.slot.lock();
        slot.root = Some(root);
        slot.certificate = if self.deferred {
            None
        } else {
            Some(self.sign_root(&root))
        };
    }

    fn data_certificate(&self) -> Option<Vec<u8>> {
        self.slot.lock().certificate.clone()
    }
}

/// Check a [`LocalCertifier`] certificate and return the certified root
pub fn verify_certificate(certificate: &[u8], public_key: &[u8; 32]) -> Result<[u8; 32]> {
    if certificate.len() != 32 + 64 {
        return Err(Error::Other(format!(
            "certificate is {} bytes, expected 96",
            certificate.len()
        )));
    }
    let (root, signature) = certificate.split_at(32);
    verify_signature(root, signature, public_key)?;

    let mut out = [0u8; 32];
    out.copy_from_slice(root);
    Ok(out)
}
