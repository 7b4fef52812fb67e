//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - Representation-independent SHA-256 hashing of [`Value`]s (the block hasher)
//! - Ed25519 key pairs used by the local certificate store

use crate::{leb128, types::BlockHash, Error, Result, Value};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash a value independently of its in-memory representation
///
/// - `Nat` / `Int` hash their (signed) LEB128 encoding
/// - `Blob` / `Text` hash their raw bytes
/// - `Array` hashes the concatenation of element hashes
/// - `Map` hashes the bytewise-sorted `H(key) || H(value)` pairs, so entry
///   order never changes the result
pub fn hash_value(value: &Value) -> BlockHash {
    match value {
        Value::Nat(n) => hash_bytes(&leb128::encode(*n)),
        Value::Int(i) => hash_bytes(&leb128::encode_signed(*i)),
        Value::Blob(bytes) => hash_bytes(bytes),
        Value::Text(text) => hash_bytes(text.as_bytes()),
        Value::Array(items) => {
            let mut hasher = Sha256::new();
            for item in items {
                hasher.update(hash_value(item));
            }
            hasher.finalize().into()
        }
        Value::Map(entries) => {
            let mut pairs: Vec<[u8; 64]> = entries
                .iter()
                .map(|(key, value)| {
                    let mut pair = [0u8; 64];
                    pair[..32].copy_from_slice(&hash_bytes(key.as_bytes()));
                    pair[32..].copy_from_slice(&hash_value(value));
                    pair
                })
                .collect();
            pairs.sort_unstable();

            let mut hasher = Sha256::new();
            for pair in &pairs {
                hasher.update(pair);
            }
            hasher.finalize().into()
        }
    }
}

/// Ed25519 key pair for signing certified roots
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a detached signature with a public key
pub fn verify_signature(message: &[u8], signature: &[u8], public_key: &[u8; 32]) -> Result<()> {
    let signature = Signature::from_slice(signature)
        .map_err(|e| Error::Other(format!("Malformed signature: {}", e)))?;
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::Other(format!("Malformed public key: {}", e)))?;

    verifying_key
        .verify(message, &signature)
        .map_err(|e| Error::Other(format!("Signature verification failed: {}", e)))
}
