//! Deactivate operation for the `did:webvh` method.
//!
//! Deactivation appends a final log entry with `deactivated` set and a
//! document with no verification methods. No entry may follow it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::log::{DidLog, DidLogEntry, Parameters, WitnessEntry};
use crate::provider::{Provider, Signature};
use crate::resolve::{LogState, Metadata, verify_log};
use crate::update::{Draft, WithSigner, WithoutSigner, append, check_rotation};
use crate::witness::DEFAULT_TIMEOUT;
use crate::{Error, Result, tracerr};

/// Builder to deactivate a DID.
///
/// Use this to construct a [`DeactivateResult`].
pub struct DeactivateBuilder<S> {
    log: DidLog,
    state: LogState,
    update_keys: Option<Vec<String>>,
    version_time: Option<DateTime<Utc>>,
    witness_timeout: Duration,
    signer: S,
}

impl DeactivateBuilder<WithoutSigner> {
    /// Create a new `DeactivateBuilder` from the current log entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the log entries are not valid or the DID is
    /// already deactivated.
    pub async fn from(
        log: &[DidLogEntry], witness_proofs: Option<&[WitnessEntry]>, provider: &impl Provider,
    ) -> Result<Self> {
        let state = verify_log(log, witness_proofs, None, provider, &[]).await?;
        if state.deactivated {
            tracerr!(Error::Policy, "DID {} is already deactivated", state.did);
        }
        Ok(Self {
            log: log.to_vec(),
            state,
            update_keys: None,
            version_time: None,
            witness_timeout: DEFAULT_TIMEOUT,
            signer: WithoutSigner,
        })
    }

    /// Replace the update keys in the final entry, for example with an empty
    /// list. The update keys are otherwise left unchanged.
    #[must_use]
    pub fn update_keys(mut self, update_keys: Vec<String>) -> Self {
        self.update_keys = Some(update_keys);
        self
    }

    /// Set the version time of the final log entry. Defaults to now.
    #[must_use]
    pub const fn version_time(mut self, version_time: DateTime<Utc>) -> Self {
        self.version_time = Some(version_time);
        self
    }

    /// Set the time allowed for each witness to return a proof.
    #[must_use]
    pub const fn witness_timeout(mut self, timeout: Duration) -> Self {
        self.witness_timeout = timeout;
        self
    }

    /// Add a signer to the builder.
    #[must_use]
    pub fn signer<S: Signature>(self, signer: &S) -> DeactivateBuilder<WithSigner<'_, S>> {
        DeactivateBuilder {
            log: self.log,
            state: self.state,
            update_keys: self.update_keys,
            version_time: self.version_time,
            witness_timeout: self.witness_timeout,
            signer: WithSigner(signer),
        }
    }
}

impl<S: Signature> DeactivateBuilder<WithSigner<'_, S>> {
    /// Build the deactivation entry and append it to the log.
    ///
    /// # Errors
    ///
    /// Will fail if the signer does not hold a current update key, replacing
    /// the update keys breaks the pre-rotation commitment, or the entry
    /// cannot be hashed or signed.
    pub async fn build(&self, provider: &impl Provider) -> Result<DeactivateResult> {
        let state = &self.state;

        let mut document = state.document.clone();
        document.clear_keys();

        let params = Parameters {
            update_keys: self.update_keys.clone().filter(|k| *k != state.update_keys),
            deactivated: Some(true),
            ..Parameters::default()
        };
        check_rotation(state, &params)?;

        let draft = Draft {
            parameters: params,
            document,
            version_time: self.version_time,
        };
        let (log, next) =
            append(&self.log, state, draft, self.signer.0, provider, self.witness_timeout).await?;

        tracing::debug!(did = %next.did, "deactivated DID");
        Ok(DeactivateResult {
            did: next.did.clone(),
            document: next.document.clone(),
            metadata: next.metadata(),
            log,
        })
    }
}

/// Output of a `deactivate` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateResult {
    /// The `did:webvh` DID.
    pub did: String,

    /// The deactivated document: without verification methods.
    pub document: Document,

    /// Metadata of the final version.
    pub metadata: Metadata,

    /// Version history log consisting of the original log appended with the
    /// deactivation entry.
    pub log: Vec<DidLogEntry>,
}
