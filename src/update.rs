//! Update operation for the `did:webvh` method.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentBuilder};
use crate::hash::hash_key;
use crate::log::{
    self, DidLog, DidLogEntry, Parameters, VersionId, Witness, WitnessEntry, substitute,
};
use crate::proof::MethodRef;
use crate::provider::{Provider, Signature};
use crate::resolve::{LogState, Metadata, verify_log};
use crate::witness::{DEFAULT_TIMEOUT, collect_proofs, validate_witness};
use crate::{Error, Result, tracerr, url};

/// Builder to update a DID document and associated log entry.
///
/// Use this to construct an [`UpdateResult`].
pub struct UpdateBuilder<S> {
    log: DidLog,
    state: LogState,

    document: Option<Document>,
    update_keys: Option<Vec<String>>,
    next_key_hashes: Option<Vec<String>>,
    portable: Option<bool>,
    witness: Option<Witness>,
    ttl: Option<u64>,
    location: Option<String>,
    version_time: Option<DateTime<Utc>>,
    witness_timeout: Duration,

    signer: S,
}

/// Builder does not have a signer (can't build).
pub struct WithoutSigner;

/// Builder has a signer (can build).
pub struct WithSigner<'a, S: Signature>(pub &'a S);

impl UpdateBuilder<WithoutSigner> {
    /// Create a new `UpdateBuilder` populated with the current log entries.
    ///
    /// The log entries must be valid so this is tested, including verifying
    /// the witness proofs if provided.
    ///
    /// # Errors
    ///
    /// Returns an error if the log entries are not valid or the DID has been
    /// deactivated.
    pub async fn from(
        log: &[DidLogEntry], witness_proofs: Option<&[WitnessEntry]>, provider: &impl Provider,
    ) -> Result<Self> {
        let state = verify_log(log, witness_proofs, None, provider, &[]).await?;
        if state.deactivated {
            tracerr!(Error::Policy, "DID {} has been deactivated", state.did);
        }

        Ok(Self {
            log: log.to_vec(),
            state,

            document: None,
            update_keys: None,
            next_key_hashes: None,
            portable: None,
            witness: None,
            ttl: None,
            location: None,
            version_time: None,
            witness_timeout: DEFAULT_TIMEOUT,

            signer: WithoutSigner,
        })
    }

    /// Replace the DID document.
    ///
    /// If not called, the current document is carried over.
    #[must_use]
    pub fn document(mut self, document: &Document) -> Self {
        self.document = Some(document.clone());
        self
    }

    /// Replace the update keys. Multikey format.
    ///
    /// If pre-rotation is active, every new key must have been committed to in
    /// the current next key hashes and a new commitment must also be made with
    /// [`Self::next_keys`].
    #[must_use]
    pub fn update_keys(mut self, update_keys: Vec<String>) -> Self {
        self.update_keys = Some(update_keys);
        self
    }

    /// Commit to the keys that may be used as update keys in the next
    /// rotation. The keys are hashed here. An empty list ends pre-rotation.
    #[must_use]
    pub fn next_keys(mut self, next_keys: &[&str]) -> Self {
        self.next_key_hashes = Some(next_keys.iter().map(|k| hash_key(k)).collect());
        self
    }

    /// Rotate the update keys and commit to the keys for the next rotation.
    ///
    /// The new update keys must not be used to sign the new log entry. Only
    /// the current update keys can sign it.
    #[must_use]
    pub fn rotate_keys(self, new_update_keys: &[&str], new_next_keys: &[&str]) -> Self {
        self.update_keys(new_update_keys.iter().map(ToString::to_string).collect())
            .next_keys(new_next_keys)
    }

    /// Set the DID to be portable or not. Portability can only be turned off
    /// after the DID is created.
    #[must_use]
    pub const fn portable(mut self, portable: bool) -> Self {
        self.portable = Some(portable);
        self
    }

    /// Replace the set of witnesses. The new witnesses take effect from the
    /// next update; this update is witnessed by the current witnesses.
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

    /// Turn witnessing off from the next update.
    #[must_use]
    pub fn remove_witness(mut self) -> Self {
        self.witness = Some(Witness::default());
        self
    }

    /// Set the permissible cache time in seconds for the DID.
    #[must_use]
    pub const fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Move the DID to a new hosting URL. The DID keeps its SCID and the
    /// previous DID is added to the document's `alsoKnownAs`.
    ///
    /// # Errors
    ///
    /// Will fail if the DID is not portable or the URL is invalid.
    pub fn move_to(mut self, url: &str) -> Result<Self> {
        if !self.state.portable {
            tracerr!(Error::Policy, "Cannot move DID: portability is disabled");
        }
        self.location = Some(url::parse_url(url)?);
        Ok(self)
    }

    /// Set the version time of the new log entry. Defaults to now.
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

    /// Add a signer to the builder.
    #[must_use]
    pub fn signer<S: Signature>(self, signer: &S) -> UpdateBuilder<WithSigner<'_, S>> {
        UpdateBuilder {
            log: self.log,
            state: self.state,

            document: self.document,
            update_keys: self.update_keys,
            next_key_hashes: self.next_key_hashes,
            portable: self.portable,
            witness: self.witness,
            ttl: self.ttl,
            location: self.location,
            version_time: self.version_time,
            witness_timeout: self.witness_timeout,

            signer: WithSigner(signer),
        }
    }
}

impl<S: Signature> UpdateBuilder<WithSigner<'_, S>> {
    /// Build the new log entry and append it to the log.
    ///
    /// # Errors
    ///
    /// Will fail if the signer does not hold a current update key, a key
    /// rotation breaks the pre-rotation commitment, the document is not for
    /// this DID, or the entry cannot be hashed or signed.
    pub async fn build(&self, provider: &impl Provider) -> Result<UpdateResult> {
        let state = &self.state;
        let did = self
            .location
            .as_ref()
            .map_or_else(|| state.did.clone(), |location| url::did(&state.scid, location));
        let moved = did != state.did;

        let mut document = match &self.document {
            Some(document) => DocumentBuilder::from(document).build(),
            None if moved => {
                let mut value = serde_json::to_value(&state.document)?;
                substitute(&mut value, &state.did, &did);
                serde_json::from_value(value)?
            }
            None => state.document.clone(),
        };
        if document.id != did {
            tracerr!(Error::Configuration, "document id {} must be {did}", document.id);
        }
        if moved {
            document = DocumentBuilder::from(&document).also_known_as(&state.did).build();
        }

        let mut params = Parameters {
            update_keys: self.update_keys.clone().filter(|k| *k != state.update_keys),
            next_key_hashes: self.next_key_hashes.clone(),
            witness: self.witness.clone().filter(|w| Some(w) != state.witness.as_ref()),
            ttl: self.ttl.filter(|t| Some(*t) != state.ttl),
            ..Parameters::default()
        };
        if let Some(portable) = self.portable.filter(|p| *p != state.portable) {
            if portable {
                tracerr!(Error::Policy, "portability can only be enabled when the DID is created");
            }
            params.portable = Some(false);
        }
        check_rotation(state, &params)?;

        let (log, next) = append(
            &self.log,
            state,
            Draft {
                parameters: params,
                document,
                version_time: self.version_time,
            },
            self.signer.0,
            provider,
            self.witness_timeout,
        )
        .await?;

        Ok(UpdateResult {
            did: next.did.clone(),
            document: next.document.clone(),
            metadata: next.metadata(),
            log,
        })
    }
}

/// Output of an `update` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    /// The `did:webvh` DID.
    pub did: String,

    /// The `did:webvh` document.
    pub document: Document,

    /// Metadata of the new version.
    pub metadata: Metadata,

    /// Version history log consisting of the original log appended with the
    /// entry describing the update operation.
    pub log: Vec<DidLogEntry>,
}

/// Check the signer holds one of the update keys.
pub(crate) async fn authorize(signer: &impl Signature, update_keys: &[String]) -> Result<()> {
    let verification_method = signer.verification_method().await?;
    let authorized = match MethodRef::parse(&verification_method)? {
        MethodRef::DidKey { multikey, .. } => update_keys.contains(&multikey),
        MethodRef::WebVh { .. } => false,
    };
    if !authorized {
        tracerr!(
            Error::Authorization,
            "signer {verification_method} is not an authorized update key"
        );
    }
    Ok(())
}

/// Check a key rotation against the pre-rotation commitment in force.
pub(crate) fn check_rotation(state: &LogState, params: &Parameters) -> Result<()> {
    if !state.prerotation() {
        return Ok(());
    }
    let Some(update_keys) = &params.update_keys else {
        return Ok(());
    };
    if params.next_key_hashes.is_none() {
        tracerr!(Error::Configuration, "nextKeyHashes are required if prerotation enabled");
    }
    if update_keys.iter().any(|k| !state.next_key_hashes.contains(&hash_key(k))) {
        tracerr!(Error::Authorization, "invalid updateKeys");
    }
    Ok(())
}

/// Content of the next log entry.
pub(crate) struct Draft {
    pub parameters: Parameters,
    pub document: Document,
    pub version_time: Option<DateTime<Utc>>,
}

/// Hash, sign and witness the next log entry, returning the extended log and
/// the state after the entry.
pub(crate) async fn append(
    log: &[DidLogEntry], state: &LogState, draft: Draft, signer: &impl Signature,
    provider: &impl Provider, witness_timeout: Duration,
) -> Result<(DidLog, LogState)> {
    authorize(signer, &state.update_keys).await?;

    let version_time = draft.version_time.unwrap_or_else(log::now);
    if version_time < state.version_time {
        tracerr!(Error::Configuration, "versionTime must not be before {}", state.version_time);
    }

    // The entry hash is computed with the previous version id in place.
    let mut entry = DidLogEntry {
        version_id: state.version_id.clone(),
        version_time,
        parameters: draft.parameters,
        state: draft.document,
        proof: Vec::new(),
    };
    let version = VersionId {
        number: state.version_number + 1,
        hash: entry.hash()?,
    };
    entry.version_id = version.to_string();
    entry.sign(signer).await?;

    let mut next = state.clone();
    next.apply(&entry, &version)?;

    let mut log = log.to_vec();
    log.push(entry);
    if let Some(witness) = state.witness_in_force() {
        let proofs = collect_proofs(witness, &log, provider, witness_timeout).await;
        let weight: u64 = proofs
            .iter()
            .filter_map(|p| MethodRef::parse(&p.verification_method).ok())
            .filter_map(|m| witness.weight(m.did()))
            .sum();
        if weight < witness.threshold {
            tracing::warn!(
                "witness weight {weight} for {version} is below the threshold {}",
                witness.threshold
            );
        }
        if let Some(entry) = log.last_mut() {
            entry.proof.extend(proofs);
        }
    }

    tracing::debug!(version_id = %version, "appended log entry");
    Ok((log, next))
}
