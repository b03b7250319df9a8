//! # DID Web with Verifiable History Resolver
//!
//! Resolution walks a `did.jsonl` log from the first entry, re-deriving every
//! hash, checking every proof against the keys authorized before the entry,
//! enforcing portability, pre-rotation and witness rules, and accumulating
//! the sparse parameters into the metadata in force. Any failure aborts
//! resolution.
//!
//! See: <https://identity.foundation/didwebvh/next/#read-resolve>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::hash::hash_key;
use crate::log::{self, DidLogEntry, Parameters, VersionId, Witness, WitnessEntry};
use crate::proof::{MethodRef, verify_proofs};
use crate::provider::LogResolver;
use crate::witness::verify_witness;
use crate::{Error, Result, method_version, tracerr, url};

/// Options for selecting the version of the DID document to resolve.
///
/// At most one selector may be set. With none set, the latest version is
/// resolved.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Resolve the version with this number.
    pub version_number: Option<u64>,

    /// Resolve the version with this `versionId`.
    pub version_id: Option<String>,

    /// Resolve the version that was current at this time.
    pub version_time: Option<DateTime<Utc>>,

    /// Resolve the first version whose document contains this verification
    /// method.
    pub verification_method: Option<String>,
}

impl ResolveOptions {
    fn selector(&self) -> Result<Option<Selector<'_>>> {
        let mut selectors = Vec::new();
        if let Some(n) = self.version_number {
            selectors.push(Selector::Number(n));
        }
        if let Some(id) = &self.version_id {
            selectors.push(Selector::Id(id));
        }
        if let Some(t) = self.version_time {
            selectors.push(Selector::Time(t));
        }
        if let Some(vm) = &self.verification_method {
            selectors.push(Selector::VerificationMethod(vm));
        }
        if selectors.len() > 1 {
            tracerr!(
                Error::Configuration,
                "only one of versionNumber, versionId, versionTime or verificationMethod may be set"
            );
        }
        Ok(selectors.pop())
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Selector<'a> {
    Number(u64),
    Id(&'a str),
    Time(DateTime<Utc>),
    VerificationMethod(&'a str),
}

impl Selector<'_> {
    fn matches(&self, state: &LogState, next: Option<&DidLogEntry>) -> bool {
        match self {
            Self::Number(n) => state.version_number == *n,
            Self::Id(id) => state.version_id == *id,
            Self::Time(t) => {
                state.version_time <= *t && next.is_none_or(|e| e.version_time > *t)
            }
            Self::VerificationMethod(vm) => state.document.verification_method(vm).is_some(),
        }
    }
}

/// Resolved DID document and metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolved {
    /// The DID.
    pub did: String,

    /// The DID document at the selected version.
    pub document: Document,

    /// Metadata in force at the selected version.
    pub metadata: Metadata,
}

/// DID document metadata accumulated from the log parameters.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Version id of the selected entry.
    pub version_id: String,

    /// Version number of the selected entry.
    pub version_number: u64,

    /// Time of the selected entry.
    pub version_time: DateTime<Utc>,

    /// Time of the first entry.
    pub created: DateTime<Utc>,

    /// Time of the selected entry.
    pub updated: DateTime<Utc>,

    /// The self-certifying identifier.
    pub scid: String,

    /// Keys authorized to sign the next entry.
    pub update_keys: Vec<String>,

    /// Committed hashes of the next update keys.
    pub next_key_hashes: Vec<String>,

    /// Whether key pre-rotation is active.
    pub prerotation: bool,

    /// Whether the DID may move to another location.
    pub portable: bool,

    /// Witness configuration in force, if witnessing is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,

    /// Whether the DID has been deactivated.
    pub deactivated: bool,

    /// Cache time-to-live in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// State accumulated while walking a log: everything in force after the last
/// entry processed.
#[derive(Clone, Debug)]
pub(crate) struct LogState {
    pub did: String,
    pub scid: String,
    pub location: String,
    pub update_keys: Vec<String>,
    pub next_key_hashes: Vec<String>,
    pub portable: bool,
    pub witness: Option<Witness>,
    pub deactivated: bool,
    pub ttl: Option<u64>,
    pub version_id: String,
    pub version_number: u64,
    pub version_time: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub document: Document,
}

impl LogState {
    /// State after the first entry.
    pub(crate) fn genesis(entry: &DidLogEntry, version: &VersionId) -> Result<Self> {
        let params = &entry.parameters;
        let Some(scid) = params.scid.clone() else {
            tracerr!(Error::Integrity, "first log entry has no scid");
        };
        let Some(update_keys) = params.update_keys.clone().filter(|k| !k.is_empty()) else {
            tracerr!(Error::Integrity, "first log entry has no update keys");
        };
        let (_, location) = url::split(&entry.state.id)?;

        Ok(Self {
            did: entry.state.id.clone(),
            location: location.to_string(),
            scid,
            update_keys,
            next_key_hashes: params.next_key_hashes.clone().unwrap_or_default(),
            portable: params.portable.unwrap_or_default(),
            witness: params.witness.clone(),
            deactivated: params.deactivated.unwrap_or_default(),
            ttl: params.ttl,
            version_id: entry.version_id.clone(),
            version_number: version.number,
            version_time: entry.version_time,
            created: entry.version_time,
            document: entry.state.clone(),
        })
    }

    /// Merge a subsequent entry into the state.
    pub(crate) fn apply(&mut self, entry: &DidLogEntry, version: &VersionId) -> Result<()> {
        let Parameters {
            update_keys,
            next_key_hashes,
            portable,
            witness,
            deactivated,
            ttl,
            ..
        } = &entry.parameters;

        if let Some(keys) = update_keys {
            self.update_keys.clone_from(keys);
        }
        if let Some(hashes) = next_key_hashes {
            self.next_key_hashes.clone_from(hashes);
        }
        if let Some(portable) = portable {
            self.portable = *portable;
        }
        if let Some(witness) = witness {
            self.witness = Some(witness.clone());
        }
        if let Some(deactivated) = deactivated {
            self.deactivated = *deactivated;
        }
        if ttl.is_some() {
            self.ttl = *ttl;
        }

        let (_, location) = url::split(&entry.state.id)?;
        self.location = location.to_string();
        self.did = entry.state.id.clone();
        self.document = entry.state.clone();
        self.version_id = entry.version_id.clone();
        self.version_number = version.number;
        self.version_time = entry.version_time;
        Ok(())
    }

    /// Whether key pre-rotation is active.
    pub(crate) const fn prerotation(&self) -> bool {
        !self.next_key_hashes.is_empty()
    }

    /// The witness configuration, if witnessing is enabled.
    pub(crate) fn witness_in_force(&self) -> Option<&Witness> {
        self.witness.as_ref().filter(|w| w.is_active())
    }

    pub(crate) fn metadata(&self) -> Metadata {
        Metadata {
            version_id: self.version_id.clone(),
            version_number: self.version_number,
            version_time: self.version_time,
            created: self.created,
            updated: self.version_time,
            scid: self.scid.clone(),
            update_keys: self.update_keys.clone(),
            next_key_hashes: self.next_key_hashes.clone(),
            prerotation: self.prerotation(),
            portable: self.portable,
            witness: self.witness_in_force().cloned(),
            deactivated: self.deactivated,
            ttl: self.ttl,
        }
    }

    pub(crate) fn resolved(&self) -> Resolved {
        Resolved {
            did: self.did.clone(),
            document: self.document.clone(),
            metadata: self.metadata(),
        }
    }
}

/// How deeply `did:webvh` verification methods may refer to other logs.
const MAX_DEPTH: usize = 8;

/// Resolve a `did:webvh` DID to a DID document.
///
/// The DID is transformed to the HTTPS URL of its `did.jsonl` log, which is
/// fetched with the resolver and verified. After a portable DID has moved,
/// versions from before the move resolve to the DID they were published
/// under.
///
/// # Errors
///
/// Will fail if the DID is invalid, the log cannot be fetched or parsed, the
/// log fails verification, or the log is not the log of the requested DID.
pub async fn resolve(
    did: &str, options: &ResolveOptions, resolver: &impl LogResolver,
) -> Result<Resolved> {
    fetch_and_resolve(did, options, resolver, &[]).await
}

/// Resolve the latest version of a DID referenced from the log of each SCID
/// in `lineage`.
pub(crate) async fn resolve_nested(
    did: &str, resolver: &impl LogResolver, lineage: &[String],
) -> Result<Resolved> {
    let (scid, _) = url::split(did)?;
    if lineage.iter().any(|s| s == scid) {
        tracerr!(Error::Integrity, "circular did:webvh reference to {did}");
    }
    if lineage.len() >= MAX_DEPTH {
        tracerr!(Error::Unsupported, "did:webvh references nested deeper than {MAX_DEPTH}");
    }
    fetch_and_resolve(did, &ResolveOptions::default(), resolver, lineage).await
}

async fn fetch_and_resolve(
    did: &str, options: &ResolveOptions, resolver: &impl LogResolver, lineage: &[String],
) -> Result<Resolved> {
    let (scid, _) = url::split(did)?;
    let url = url::http_url(did, None)?;
    let jsonl = resolver
        .fetch_log(&url)
        .await
        .map_err(|e| Error::Network(format!("failed to fetch {url}: {e}")))?;
    let log = log::parse_log(&jsonl)?;

    let state = verify_log(&log, None, options.selector()?, resolver, lineage).await?;
    if state.scid != scid {
        tracerr!(Error::Integrity, "log at {url} is for {} not {did}", state.did);
    }
    Ok(state.resolved())
}

/// Verify a log and resolve the DID document at the selected version.
///
/// Witness proofs supplied out of band (the contents of a `did-witness.json`
/// file) are combined with witness proofs carried in the log entries.
///
/// # Errors
///
/// Will fail if any entry up to the selected version fails verification, if
/// more than one selector is set, or if the selected version is not in the
/// log.
pub async fn resolve_log(
    log: &[DidLogEntry], witness_proofs: Option<&[WitnessEntry]>, options: &ResolveOptions,
    resolver: &impl LogResolver,
) -> Result<Resolved> {
    let selector = options.selector()?;
    let state = verify_log(log, witness_proofs, selector, resolver, &[]).await?;
    Ok(state.resolved())
}

/// Walk the log, returning the state at the selected entry or, with no
/// selector, after the last.
///
/// `lineage` holds the SCIDs of the logs whose verification led here.
pub(crate) async fn verify_log(
    log: &[DidLogEntry], witness_proofs: Option<&[WitnessEntry]>, selector: Option<Selector<'_>>,
    resolver: &impl LogResolver, lineage: &[String],
) -> Result<LogState> {
    let mut chain = lineage.to_vec();
    if let Some(scid) = log.first().and_then(|e| e.parameters.scid.clone()) {
        chain.push(scid);
    }
    let mut current: Option<LogState> = None;

    for (index, entry) in log.iter().enumerate() {
        let version = entry.version()?;
        let expected = index as u64 + 1;
        if version.number != expected {
            tracing::error!("log entry {} is out of order", entry.version_id);
            return Err(Error::OutOfOrder {
                expected,
                found: version.number,
            });
        }

        let next = match &current {
            None => verify_genesis(entry, &version, resolver, &chain).await?,
            Some(previous) => verify_entry(previous, entry, &version, resolver, &chain).await?,
        };

        // The first entry is witnessed under its own configuration, later
        // entries under the configuration in force before them.
        let witness = match &current {
            None => next.witness_in_force(),
            Some(previous) => previous.witness_in_force(),
        };
        if let Some(witness) = witness {
            // Controller proofs were checked with the entry.
            let embedded = entry
                .proof
                .iter()
                .filter(|p| {
                    MethodRef::parse(&p.verification_method)
                        .is_ok_and(|m| witness.weight(m.did()).is_some())
                })
                .cloned()
                .collect();
            let mut entries = vec![WitnessEntry {
                version_id: entry.version_id.clone(),
                proof: embedded,
            }];
            entries.extend_from_slice(witness_proofs.unwrap_or_default());
            verify_witness(&entry.version_id, &entries, witness, resolver, &chain).await?;
        }

        tracing::debug!(version_id = %entry.version_id, "verified log entry");

        if selector.is_some_and(|s| s.matches(&next, log.get(index + 1))) {
            return Ok(next);
        }
        current = Some(next);
    }

    let Some(state) = current else {
        tracerr!(Error::NotFound, "log is empty");
    };
    if let Some(selector) = selector {
        tracerr!(Error::NotFound, "no log entry matches {selector:?}");
    }
    Ok(state)
}

async fn verify_genesis(
    entry: &DidLogEntry, version: &VersionId, resolver: &impl LogResolver, lineage: &[String],
) -> Result<LogState> {
    let method = entry.parameters.method.as_deref().unwrap_or_default();
    if method != method_version() {
        tracerr!(Error::Unsupported, "method '{method}' is not supported");
    }
    let Some(scid) = &entry.parameters.scid else {
        tracerr!(Error::Integrity, "first log entry has no scid");
    };
    entry.verify_scid(scid)?;
    entry.verify_hash(scid)?;

    let state = LogState::genesis(entry, version)?;
    let (did_scid, _) = url::split(&entry.state.id)?;
    if did_scid != state.scid {
        tracerr!(Error::Integrity, "DID {} does not contain the scid", entry.state.id);
    }

    verify_proofs(entry, &state.update_keys, state.witness_in_force(), resolver, lineage).await?;
    Ok(state)
}

async fn verify_entry(
    previous: &LogState, entry: &DidLogEntry, version: &VersionId, resolver: &impl LogResolver,
    lineage: &[String],
) -> Result<LogState> {
    let params = &entry.parameters;

    entry.verify_hash(&previous.version_id)?;

    if let Some(method) = &params.method {
        if *method != method_version() {
            tracerr!(Error::Unsupported, "method '{method}' is not supported");
        }
    }

    if params.scid.as_ref().is_some_and(|scid| *scid != previous.scid) {
        tracerr!(Error::Integrity, "scid cannot change at version {}", version.number);
    }
    let (scid, location) = url::split(&entry.state.id)?;
    if scid != previous.scid {
        tracerr!(Error::Integrity, "DID {} does not contain the scid", entry.state.id);
    }

    if entry.version_time < previous.version_time {
        tracerr!(
            Error::Integrity,
            "versionTime of version {} is before its predecessor",
            version.number
        );
    }

    if previous.deactivated {
        tracerr!(Error::Policy, "DID was deactivated at version {}", previous.version_number);
    }

    if location != previous.location && !previous.portable {
        tracerr!(Error::Policy, "Cannot move DID: portability is disabled");
    }
    if params.portable == Some(true) && !previous.portable {
        tracerr!(Error::Policy, "portability can only be enabled in the first log entry");
    }

    if previous.prerotation() {
        if let Some(keys) = params.update_keys.as_ref().filter(|k| **k != previous.update_keys) {
            if params.next_key_hashes.is_none() {
                tracerr!(Error::Integrity, "nextKeyHashes are required if prerotation enabled");
            }
            if keys.iter().any(|k| !previous.next_key_hashes.contains(&hash_key(k))) {
                tracerr!(Error::Authorization, "invalid updateKeys");
            }
        }
    }

    let witness = previous.witness_in_force();
    verify_proofs(entry, &previous.update_keys, witness, resolver, lineage).await?;

    let mut next = previous.clone();
    next.apply(entry, version)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_selector() {
        assert!(ResolveOptions::default().selector().expect("should be valid").is_none());

        let options = ResolveOptions {
            version_id: Some("2-zHash".to_string()),
            ..ResolveOptions::default()
        };
        assert!(matches!(options.selector(), Ok(Some(Selector::Id("2-zHash")))));

        let options = ResolveOptions {
            version_number: Some(2),
            verification_method: Some("#key-1".to_string()),
            ..ResolveOptions::default()
        };
        assert!(matches!(options.selector(), Err(Error::Configuration(_))));
    }
}
