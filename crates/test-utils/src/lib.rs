//! Keyring and in-memory provider for testing `did:webvh` operations.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use credibil_webvh::key::{did_key, encode_multikey};
use credibil_webvh::proof::{Proof, witness_proof};
use credibil_webvh::{Algorithm, DidLogEntry, LogResolver, Signature, WitnessClient};
use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;

/// An Ed25519 signing key and the key committed for its next rotation.
#[derive(Clone, Debug)]
pub struct Keyring {
    signing_key: SigningKey,
    next_key: SigningKey,
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring {
    /// Create a new keyring with freshly generated current and next keys.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            next_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// The current public key as a multikey.
    #[must_use]
    pub fn multikey(&self) -> String {
        encode(&self.signing_key)
    }

    /// The next public key as a multikey.
    #[must_use]
    pub fn next_multikey(&self) -> String {
        encode(&self.next_key)
    }

    /// The `did:key` DID of the current key, as used to identify a witness.
    #[must_use]
    pub fn did_key(&self) -> String {
        did_key(&self.multikey())
    }

    /// Promote the next key to current and generate a new next key.
    pub fn rotate(&mut self) {
        self.signing_key = std::mem::replace(&mut self.next_key, SigningKey::generate(&mut OsRng));
    }
}

fn encode(key: &SigningKey) -> String {
    encode_multikey(key.verifying_key().as_bytes()).expect("should encode multikey")
}

impl Signature for Keyring {
    async fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(msg).to_bytes().to_vec())
    }

    async fn verifying_key(&self) -> Result<Vec<u8>> {
        Ok(self.signing_key.verifying_key().as_bytes().to_vec())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }
}

/// Serves DID logs from memory and signs witness proofs with local keyrings.
#[derive(Clone, Debug, Default)]
pub struct MockProvider {
    logs: HashMap<String, String>,
    witnesses: HashMap<String, (Keyring, Option<Duration>)>,
}

impl MockProvider {
    /// Create a provider with no logs and no witnesses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `jsonl` when `url` is fetched.
    #[must_use]
    pub fn with_log(mut self, url: impl Into<String>, jsonl: impl Into<String>) -> Self {
        self.logs.insert(url.into(), jsonl.into());
        self
    }

    /// Add a witness that responds immediately.
    #[must_use]
    pub fn with_witness(mut self, keyring: &Keyring) -> Self {
        self.witnesses.insert(keyring.did_key(), (keyring.clone(), None));
        self
    }

    /// Add a witness that waits `delay` before responding.
    #[must_use]
    pub fn with_slow_witness(mut self, keyring: &Keyring, delay: Duration) -> Self {
        self.witnesses.insert(keyring.did_key(), (keyring.clone(), Some(delay)));
        self
    }
}

impl LogResolver for MockProvider {
    async fn fetch_log(&self, url: &str) -> Result<String> {
        self.logs.get(url).cloned().ok_or_else(|| anyhow!("404 Not Found: {url}"))
    }
}

impl WitnessClient for MockProvider {
    async fn request_proof(&self, witness_id: &str, log: &[DidLogEntry]) -> Result<Proof> {
        let Some((keyring, delay)) = self.witnesses.get(witness_id) else {
            return Err(anyhow!("unknown witness {witness_id}"));
        };
        if let Some(delay) = delay {
            tokio::time::sleep(*delay).await;
        }
        let Some(last) = log.last() else {
            return Err(anyhow!("log is empty"));
        };
        Ok(witness_proof(&last.version_id, keyring).await?)
    }
}
