//! # Keys
//!
//! Ed25519 public keys are exchanged as multikeys: the multicodec prefix
//! `0xed 0x01` followed by the 32 raw key bytes, encoded as base58btc
//! multibase.

use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use multibase::Base;

use crate::{ProofError, Result};

/// Multicodec prefix for an Ed25519 public key.
pub const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

const DID_KEY_PREFIX: &str = "did:key:";

/// Encode raw Ed25519 public key bytes as a multikey.
///
/// # Errors
///
/// Will fail if the key is not 32 bytes long.
pub fn encode_multikey(public_key: &[u8]) -> Result<String> {
    if public_key.len() != PUBLIC_KEY_LENGTH {
        return Err(ProofError::KeyFormat(format!(
            "Ed25519 public key must be {PUBLIC_KEY_LENGTH} bytes, got {}",
            public_key.len()
        ))
        .into());
    }
    let bytes = [ED25519_CODEC.as_slice(), public_key].concat();
    Ok(multibase::encode(Base::Base58Btc, bytes))
}

/// Decode a multikey into an Ed25519 verifying key.
///
/// # Errors
///
/// Will fail with `ProofError::KeyFormat` if the value is not base58btc, does
/// not carry the Ed25519 multicodec prefix, or is not a valid curve point.
pub fn decode_multikey(multikey: &str) -> Result<VerifyingKey> {
    let (base, bytes) = multibase::decode(multikey)?;
    if base != Base::Base58Btc {
        return Err(ProofError::KeyFormat("multikey must be base58btc encoded".into()).into());
    }
    let Some(raw) = bytes.strip_prefix(ED25519_CODEC.as_slice()) else {
        return Err(ProofError::KeyFormat("multikey is not an Ed25519 public key".into()).into());
    };
    let raw: [u8; PUBLIC_KEY_LENGTH] = raw.try_into().map_err(|_| {
        ProofError::KeyFormat(format!("Ed25519 public key must be {PUBLIC_KEY_LENGTH} bytes"))
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|e| ProofError::KeyFormat(e.to_string()).into())
}

/// The `did:key` DID for a multikey.
#[must_use]
pub fn did_key(multikey: &str) -> String {
    format!("{DID_KEY_PREFIX}{multikey}")
}

/// The `did:key` verification method URL for a multikey:
/// `did:key:<multikey>#<multikey>`.
#[must_use]
pub fn did_key_url(multikey: &str) -> String {
    format!("{DID_KEY_PREFIX}{multikey}#{multikey}")
}

/// Extract the multikey from a `did:key` DID or DID URL.
#[must_use]
pub fn multikey_from_did(did: &str) -> Option<&str> {
    let key = did.strip_prefix(DID_KEY_PREFIX)?;
    let key = key.split_once('#').map_or(key, |(k, _)| k);
    if key.is_empty() { None } else { Some(key) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn multikey_prefix() {
        let multikey = encode_multikey(&[1u8; 32]).expect("should encode");
        assert!(multikey.starts_with("z6Mk"));
    }

    #[test]
    fn reject_other_codec() {
        // secp256k1 multicodec
        let bytes = [[0xe7, 0x01].as_slice(), [2u8; 33].as_slice()].concat();
        let multikey = multibase::encode(Base::Base58Btc, bytes);
        let Err(Error::Verification(ProofError::KeyFormat(_))) = decode_multikey(&multikey) else {
            panic!("should reject non-Ed25519 key");
        };
    }

    #[test]
    fn did_key_parts() {
        let url = did_key_url("z6MkTest");
        assert_eq!(url, "did:key:z6MkTest#z6MkTest");
        assert_eq!(multikey_from_did(&url), Some("z6MkTest"));
        assert_eq!(multikey_from_did("did:key:z6MkTest"), Some("z6MkTest"));
        assert_eq!(multikey_from_did("did:web:example.com"), None);
    }
}
