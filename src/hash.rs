//! # Hashing
//!
//! Every hash in a `did:webvh` log is the SHA-256 digest of the JSON
//! Canonicalization Scheme (JCS) serialization of a value, wrapped as a
//! multihash and encoded as base58btc multibase (a `z` prefixed string).

use multibase::Base;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::Result;

/// Multihash prefix for a 32-byte SHA-256 digest.
const SHA2_256: [u8; 2] = [0x12, 0x20];

/// Hash a value: JCS, SHA-256, multihash, base58btc.
///
/// # Errors
///
/// Will fail if the value cannot be serialized to canonical JSON.
pub fn hash<T: Serialize>(value: &T) -> Result<String> {
    let canonical = serde_json_canonicalizer::to_string(value)?;
    Ok(encode(canonical.as_bytes()))
}

/// Hash a multikey for a `nextKeyHashes` pre-rotation commitment.
///
/// The multikey string itself is hashed, not its canonical JSON form.
#[must_use]
pub fn hash_key(multikey: &str) -> String {
    encode(multikey.as_bytes())
}

/// The raw SHA-256 digest of the canonical JSON of a value, as used in
/// signature payloads.
///
/// # Errors
///
/// Will fail if the value cannot be serialized to canonical JSON.
pub fn digest<T: Serialize>(value: &T) -> Result<[u8; 32]> {
    let canonical = serde_json_canonicalizer::to_string(value)?;
    Ok(Sha256::digest(canonical.as_bytes()).into())
}

fn encode(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let multihash = [SHA2_256.as_slice(), digest.as_slice()].concat();
    multibase::encode(Base::Base58Btc, multihash)
}
