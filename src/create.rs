//! Create operation for the `did:webvh` method.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Kind;
use crate::document::{Document, DocumentBuilder, KeyPurpose, Service};
use crate::hash::hash_key;
use crate::log::{self, DidLogEntry, Parameters, Witness, substitute};
use crate::provider::{Provider, Signature};
use crate::resolve::{LogState, Metadata};
use crate::update::authorize;
use crate::witness::{DEFAULT_TIMEOUT, collect_proofs, validate_witness};
use crate::{Error, Result, SCID_PLACEHOLDER, method_version, tracerr, url};

/// Builder to create a new `did:webvh` document and associated DID url and log.
///
/// Use this to construct a [`CreateResult`].
pub struct CreateBuilder<U, K, V> {
    location: U,
    update_keys: K,
    verification_methods: V,

    portable: bool,
    prerotation: bool,
    next_key_hashes: Vec<String>,
    witness: Option<Witness>,
    ttl: Option<u64>,
    version_time: Option<DateTime<Utc>>,
    witness_timeout: Duration,
}

// Typestate state guards for `CreateBuilder`.

/// The `CreateBuilder` is without an HTTP URL.
pub struct WithoutUrl;
/// The `CreateBuilder` has an HTTP URL.
pub struct WithUrl(DocumentBuilder);
/// The `CreateBuilder` is without update keys.
pub struct WithoutUpdateKeys;
/// The `CreateBuilder` has update keys.
pub struct WithUpdateKeys(Vec<String>);
/// The `CreateBuilder` is without verification methods.
pub struct WithoutVerificationMethods;
/// The `CreateBuilder` has verification methods.
pub struct WithVerificationMethods;

impl Default for CreateBuilder<WithoutUrl, WithoutUpdateKeys, WithoutVerificationMethods> {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateBuilder<WithoutUrl, WithoutUpdateKeys, WithoutVerificationMethods> {
    /// Create a new `CreateBuilder`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            location: WithoutUrl,
            update_keys: WithoutUpdateKeys,
            verification_methods: WithoutVerificationMethods,

            portable: false,
            prerotation: false,
            next_key_hashes: Vec::new(),
            witness: None,
            ttl: None,
            version_time: None,
            witness_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Add the hosting URL for the DID log.
    ///
    /// The provided url should be a valid HTTP URL.
    ///
    /// Valid examples:
    /// - `https://example.com`
    /// - `http://example.com/custom/path/`
    /// - `https://example.com:8080`
    ///
    /// # Errors
    ///
    /// Will fail if the URL cannot be parsed into the location portion of a
    /// `did:webvh` DID.
    pub fn url(
        self, url: &str,
    ) -> Result<CreateBuilder<WithUrl, WithoutUpdateKeys, WithoutVerificationMethods>> {
        let location = url::parse_url(url)?;
        let did = url::did(SCID_PLACEHOLDER, &location);
        Ok(CreateBuilder {
            location: WithUrl(DocumentBuilder::new(did)),
            update_keys: self.update_keys,
            verification_methods: self.verification_methods,

            portable: self.portable,
            prerotation: self.prerotation,
            next_key_hashes: self.next_key_hashes,
            witness: self.witness,
            ttl: self.ttl,
            version_time: self.version_time,
            witness_timeout: self.witness_timeout,
        })
    }
}

impl<K, V> CreateBuilder<WithUrl, K, V> {
    /// The preliminary DID, with the `{SCID}` placeholder in place of the
    /// SCID computed during `build`.
    #[must_use]
    pub fn did(&self) -> &str {
        self.location.0.did()
    }
}

impl CreateBuilder<WithUrl, WithoutUpdateKeys, WithoutVerificationMethods> {
    /// Add an array of public keys associated with private keys authorized to
    /// sign log entries for this DID. Multikey format.
    ///
    /// # Errors
    ///
    /// Will fail if the update keys are empty.
    pub fn update_keys(
        self, update_keys: Vec<String>,
    ) -> Result<CreateBuilder<WithUrl, WithUpdateKeys, WithoutVerificationMethods>> {
        if update_keys.is_empty() {
            tracerr!(Error::Configuration, "update keys must not be empty");
        }
        Ok(CreateBuilder {
            location: self.location,
            update_keys: WithUpdateKeys(update_keys),
            verification_methods: self.verification_methods,

            portable: self.portable,
            prerotation: self.prerotation,
            next_key_hashes: self.next_key_hashes,
            witness: self.witness,
            ttl: self.ttl,
            version_time: self.version_time,
            witness_timeout: self.witness_timeout,
        })
    }
}

impl CreateBuilder<WithUrl, WithUpdateKeys, WithoutVerificationMethods> {
    /// Add the first key to be included in the DID document as a `Multikey`
    /// verification method.
    ///
    /// At least one key is required to build the output result.
    #[must_use]
    pub fn add_key(
        self, multikey: impl Into<String>, purpose: KeyPurpose,
    ) -> CreateBuilder<WithUrl, WithUpdateKeys, WithVerificationMethods> {
        CreateBuilder {
            location: WithUrl(self.location.0.add_key(multikey, purpose)),
            update_keys: self.update_keys,
            verification_methods: WithVerificationMethods,

            portable: self.portable,
            prerotation: self.prerotation,
            next_key_hashes: self.next_key_hashes,
            witness: self.witness,
            ttl: self.ttl,
            version_time: self.version_time,
            witness_timeout: self.witness_timeout,
        }
    }
}

impl CreateBuilder<WithUrl, WithUpdateKeys, WithVerificationMethods> {
    /// Add another key to the DID document.
    ///
    /// This can be called multiple times to add more keys, or to add the same
    /// key to more verification relationships.
    #[must_use]
    pub fn add_key(mut self, multikey: impl Into<String>, purpose: KeyPurpose) -> Self {
        self.location.0 = self.location.0.add_key(multikey, purpose);
        self
    }

    /// Add a service endpoint to the DID document. A fragment id such as
    /// `#whois` is made relative to the DID.
    #[must_use]
    pub fn service(mut self, service: Service) -> Self {
        self.location.0 = self.location.0.service(service);
        self
    }

    /// Add a context to the DID document, in addition to the base contexts.
    #[must_use]
    pub fn context(mut self, context: Value) -> Self {
        self.location.0 = self.location.0.context(Kind::Object(context));
        self
    }

    /// Add an also-known-as identifier to the DID document.
    #[must_use]
    pub fn also_known_as(mut self, aka: impl Into<String>) -> Self {
        self.location.0 = self.location.0.also_known_as(aka);
        self
    }

    /// Set the DID to be portable (defaults to not portable). Portability can
    /// only be enabled when the DID is created.
    #[must_use]
    pub const fn portable(mut self, portable: bool) -> Self {
        self.portable = portable;
        self
    }

    /// Require key pre-rotation. At least one next key must be committed with
    /// [`Self::next_key`] or [`Self::next_key_hash`].
    #[must_use]
    pub const fn prerotation(mut self, prerotation: bool) -> Self {
        self.prerotation = prerotation;
        self
    }

    /// Commit to a key that may be used as an update key in a later rotation.
    /// The key is hashed here. Enables pre-rotation.
    #[must_use]
    pub fn next_key(mut self, multikey: &str) -> Self {
        self.next_key_hashes.push(hash_key(multikey));
        self
    }

    /// Commit to a pre-computed next key hash. Enables pre-rotation.
    #[must_use]
    pub fn next_key_hash(mut self, next_key_hash: impl Into<String>) -> Self {
        self.next_key_hashes.push(next_key_hash.into());
        self
    }

    /// Add a set of witnesses to the create operation.
    ///
    /// # Errors
    ///
    /// Will fail if the witness configuration is invalid. See
    /// [`crate::witness::validate_witness`].
    pub fn witness(mut self, witness: &Witness) -> Result<Self> {
        validate_witness(witness)?;
        self.witness = Some(witness.clone());
        Ok(self)
    }

    /// Set the permissible cache time in seconds for the DID.
    #[must_use]
    pub const fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the version time of the log entry. Defaults to now.
    #[must_use]
    pub const fn version_time(mut self, version_time: DateTime<Utc>) -> Self {
        self.version_time = Some(version_time);
        self
    }

    /// Set the time allowed for each witness to return a proof. Defaults to
    /// 10 seconds.
    #[must_use]
    pub const fn witness_timeout(mut self, timeout: Duration) -> Self {
        self.witness_timeout = timeout;
        self
    }

    /// Build the `CreateResult`, signing the log entry with `signer` and, if
    /// witnesses are configured, collecting their proofs through `provider`.
    ///
    /// # Errors
    ///
    /// Will fail if pre-rotation is required without a next key, if the signer
    /// does not hold one of the update keys or fails to sign, or if the log
    /// entry cannot be hashed.
    pub async fn build(
        self, signer: &impl Signature, provider: &impl Provider,
    ) -> Result<CreateResult> {
        if self.prerotation && self.next_key_hashes.is_empty() {
            tracerr!(Error::Configuration, "nextKeyHashes are required if prerotation enabled");
        }
        let update_keys = self.update_keys.0;
        authorize(signer, &update_keys).await?;

        let params = Parameters {
            method: Some(method_version()),
            scid: Some(SCID_PLACEHOLDER.to_string()),
            update_keys: Some(update_keys),
            portable: Some(self.portable),
            next_key_hashes: (!self.next_key_hashes.is_empty()).then_some(self.next_key_hashes),
            witness: self.witness,
            deactivated: Some(false),
            ttl: self.ttl,
        };

        // The SCID is the hash of the entry with the `{SCID}` placeholder in
        // place of the SCID everywhere, including the version id.
        let provisional = DidLogEntry {
            version_id: SCID_PLACEHOLDER.to_string(),
            version_time: self.version_time.unwrap_or_else(log::now),
            parameters: params,
            state: self.location.0.build(),
            proof: Vec::new(),
        };
        let scid = provisional.hash()?;

        let mut value = serde_json::to_value(&provisional)?;
        substitute(&mut value, SCID_PLACEHOLDER, &scid);
        let mut entry: DidLogEntry = serde_json::from_value(value)?;

        let entry_hash = entry.hash()?;
        entry.version_id = format!("1-{entry_hash}");
        let version = entry.version()?;

        entry.sign(signer).await?;

        let state = LogState::genesis(&entry, &version)?;
        let mut log = vec![entry];
        if let Some(witness) = state.witness_in_force() {
            let proofs = collect_proofs(witness, &log, provider, self.witness_timeout).await;
            tracing::debug!(
                "collected {} of {} witness proofs",
                proofs.len(),
                witness.witnesses.len()
            );
            if let Some(entry) = log.last_mut() {
                entry.proof.extend(proofs);
            }
        }

        tracing::debug!(did = %state.did, "created DID");
        Ok(CreateResult {
            did: state.did.clone(),
            document: state.document.clone(),
            metadata: state.metadata(),
            log,
        })
    }
}

/// Output of a `create` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    /// The `did:webvh` DID.
    pub did: String,

    /// The `did:webvh` document.
    pub document: Document,

    /// Metadata of the created version.
    pub metadata: Metadata,

    /// Version history log with the single created entry suitable for writing
    /// to a `did.jsonl` log file.
    pub log: Vec<DidLogEntry>,
}
