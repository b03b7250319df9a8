//! # Provider Traits
//!
//! Collaborators the library reaches through traits: a signer holding the
//! private key, a resolver fetching remote logs, and a client asking witnesses
//! for proofs. Implementers return `anyhow` errors, which the library wraps.

use std::future::Future;

use anyhow::Result;

use crate::key;
use crate::log::DidLogEntry;
use crate::proof::Proof;

/// Signing algorithms a [`Signature`] implementer may report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// Ed25519 (pure `EdDSA`). The only algorithm usable with
    /// `eddsa-jcs-2022` proofs.
    EdDSA,

    /// secp256k1 ECDSA.
    ES256K,
}

/// [`Signature`] signs log entries and witness attestations.
pub trait Signature: Send + Sync {
    /// Sign the message, returning the raw signature bytes.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// The raw public key bytes of the signing key.
    fn verifying_key(&self) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// The signing algorithm.
    fn algorithm(&self) -> Algorithm;

    /// The verification method the verifier should use to verify the signer's
    /// signature.
    ///
    /// Defaults to the `did:key` URL of the verifying key,
    /// `did:key:<multikey>#<multikey>`.
    fn verification_method(&self) -> impl Future<Output = Result<String>> + Send {
        async {
            let verifying_key = self.verifying_key().await?;
            let multikey = key::encode_multikey(&verifying_key)?;
            Ok(key::did_key_url(&multikey))
        }
    }
}

/// [`LogResolver`] fetches the raw `did.jsonl` content hosted at a URL.
///
/// Implementers may fetch over HTTPS, read a local cache, or serve logs from
/// memory.
pub trait LogResolver: Send + Sync {
    /// Fetch the log at `url`.
    fn fetch_log(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// [`WitnessClient`] asks a witness to attest to the latest entry of a log.
pub trait WitnessClient: Send + Sync {
    /// Request a proof from the witness with DID `witness_id` over the last
    /// entry of `log`.
    fn request_proof(
        &self, witness_id: &str, log: &[DidLogEntry],
    ) -> impl Future<Output = Result<Proof>> + Send;
}

/// [`Provider`] bundles the collaborators the builders and resolver need.
pub trait Provider: LogResolver + WitnessClient {}

impl<T> Provider for T where T: LogResolver + WitnessClient {}
