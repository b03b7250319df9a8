//! # DID Log
//!
//! The `did.jsonl` log file: one [`DidLogEntry`] per line, each a full
//! version of the DID document together with the parameters that changed at
//! that version and the proofs authorizing it.
//!
//! <https://identity.foundation/didwebvh/#the-did-log-file>

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::hash::hash;
use crate::proof::{self, Proof};
use crate::provider::Signature;
use crate::{Error, Result, SCID_PLACEHOLDER, tracerr};

/// A `DidLog` is a set of log entries for a DID document.
pub type DidLog = Vec<DidLogEntry>;

/// `DidLogEntry` is an entry in the `did.jsonl` log file denoting the
/// sequential changes to a DID document.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidLogEntry {
    /// DID version number starting at 1 and incrementing by one per DID
    /// version, a literal dash `-`, and the `entryHash`.
    pub version_id: String,

    /// A UTC timestamp in ISO 8601 format.
    pub version_time: DateTime<Utc>,

    /// Log entry parameters. Only the parameters that change at this version
    /// are present, except in the first entry which carries them all.
    pub parameters: Parameters,

    /// The DID document for this version.
    pub state: Document,

    /// Data integrity proofs: the controller's and, optionally, witnesses'.
    ///
    /// The proof is required in a final log entry but excluded when hashing,
    /// so is skipped when empty.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub proof: Vec<Proof>,
}

impl DidLogEntry {
    /// A copy of the entry without proofs.
    #[must_use]
    pub fn unsigned(&self) -> Self {
        Self {
            version_id: self.version_id.clone(),
            version_time: self.version_time,
            parameters: self.parameters.clone(),
            state: self.state.clone(),
            proof: Vec::new(),
        }
    }

    /// Generate a hash of the entry, excluding proofs.
    ///
    /// # Errors
    ///
    /// Will return an error if the entry fails serialization.
    pub fn hash(&self) -> Result<String> {
        hash(&self.unsigned())
    }

    /// Parse the entry's `versionId`.
    ///
    /// # Errors
    ///
    /// Will fail if the version id is not of the form `<number>-<hash>`.
    pub fn version(&self) -> Result<VersionId> {
        self.version_id.parse()
    }

    /// Verify the hash in the entry's version id, recomputing it with the
    /// version id replaced by the previous entry's version id (or the SCID for
    /// the first entry).
    ///
    /// # Errors
    ///
    /// Will return an `Error::Integrity` if the recomputed hash differs.
    pub fn verify_hash(&self, previous_version: &str) -> Result<()> {
        let version = self.version()?;
        let mut entry = self.unsigned();
        entry.version_id = previous_version.to_string();
        if entry.hash()? != version.hash {
            tracerr!(Error::Integrity, "hash chain broken at version {}", version.number);
        }
        Ok(())
    }

    /// Verify the SCID is the hash of this (first) entry as it was before the
    /// SCID was known.
    ///
    /// # Errors
    ///
    /// Will return an `Error::Integrity` if the recomputed hash differs.
    pub fn verify_scid(&self, scid: &str) -> Result<()> {
        let mut value = serde_json::to_value(self.unsigned())?;
        substitute(&mut value, scid, SCID_PLACEHOLDER);
        if let Value::Object(map) = &mut value {
            map.insert("versionId".to_string(), Value::String(SCID_PLACEHOLDER.to_string()));
        }
        if hash(&value)? != scid {
            tracerr!(Error::Integrity, "SCID {scid} does not match the first log entry");
        }
        Ok(())
    }

    /// Construct a controller's data integrity proof for the log entry and
    /// add it to the entry's proofs.
    ///
    /// # Errors
    ///
    /// Will return an error if the signer algorithm is not `EdDSA`, if the
    /// signer fails, or if the proof structure cannot be serialized.
    pub async fn sign(&mut self, signer: &impl Signature) -> Result<()> {
        let proof = proof::create_proof(&self.unsigned(), signer).await?;
        self.proof.push(proof);
        Ok(())
    }
}

/// A parsed `versionId`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionId {
    /// Version number, starting at 1.
    pub number: u64,

    /// Entry hash.
    pub hash: String,
}

impl FromStr for VersionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((number, hash)) = s.split_once('-') else {
            return Err(Error::Integrity(format!("invalid versionId {s}")));
        };
        let Ok(number) = number.parse::<u64>() else {
            return Err(Error::Integrity(format!("invalid version number in versionId {s}")));
        };
        if number == 0 || hash.is_empty() {
            return Err(Error::Integrity(format!("invalid versionId {s}")));
        }
        Ok(Self {
            number,
            hash: hash.to_string(),
        })
    }
}

impl Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number, self.hash)
    }
}

/// Parameters for a DID log entry.
///
/// Absent parameters inherit the value in force at the previous entry.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    /// The `did:webvh` specification version to use when processing a DID's
    /// log file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// The value of the self-certifying identifier (SCID) for this DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scid: Option<String>,

    /// An array of public keys associated with private keys authorized to sign
    /// log entries for this DID. Multikey format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_keys: Option<Vec<String>>,

    /// Can the DID be renamed and hosted on a different domain?
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portable: Option<bool>,

    /// Hashes of public keys that may be added to the update keys in
    /// subsequent key rotation operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key_hashes: Option<Vec<String>>,

    /// Parameters for declaring witnesses for the DID and the process for
    /// updating the DID via collaboration with witnesses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,

    /// Indicator of whether the DID has been deactivated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated: Option<bool>,

    /// Maximum time in seconds the DID should be cached before a full
    /// resolution must be performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// A list of IDs of witnesses and their contribution to verification of
/// changes to the DID document.
///
/// An empty witness object (`{}`) turns witnessing off.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Witness {
    /// The total of the weights of witnesses required to approve a change.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub threshold: u64,

    /// The list of witnesses and their contributing weights.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witnesses: Vec<WitnessWeight>,
}

impl Witness {
    /// Whether this configuration requires witness approval.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.threshold > 0 && !self.witnesses.is_empty()
    }

    /// The weight of the witness with the given DID, if it is configured.
    #[must_use]
    pub fn weight(&self, id: &str) -> Option<u64> {
        self.witnesses.iter().find(|w| w.id == id).map(|w| w.weight)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// The weight a witness contributes to the approval of a DID update.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WitnessWeight {
    /// The DID of the witness.
    pub id: String,

    /// The weight of the witness.
    pub weight: u64,
}

/// Entry in the `did-witness.json` file.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WitnessEntry {
    /// Version ID of the DID log entry to which the witnesses' proof applies.
    pub version_id: String,

    /// Witnesses' proof of the DID log entry using the `eddsa-jcs-2022`
    /// cryptosuite.
    pub proof: Vec<Proof>,
}

/// Replace every occurrence of `from` with `to` in the string values of a
/// JSON tree. Object keys are left alone.
pub fn substitute(value: &mut Value, from: &str, to: &str) {
    match value {
        Value::String(s) => {
            if s.contains(from) {
                *s = s.replace(from, to);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, from, to);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute(item, from, to);
            }
        }
        _ => {}
    }
}

/// Parse the contents of a `did.jsonl` file. Blank lines are ignored.
///
/// # Errors
///
/// Will fail if a line is not a valid log entry.
pub fn parse_log(jsonl: &str) -> Result<DidLog> {
    jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                Error::Serialization(format!("invalid log entry on line {}: {e}", n + 1))
            })
        })
        .collect()
}

/// Serialize a log to JSON Lines, one entry per line.
///
/// # Errors
///
/// Will fail if an entry cannot be serialized.
pub fn to_jsonl(log: &[DidLogEntry]) -> Result<String> {
    let mut jsonl = String::new();
    for entry in log {
        jsonl.push_str(&serde_json::to_string(entry)?);
        jsonl.push('\n');
    }
    Ok(jsonl)
}

/// The current time at the precision written to logs.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
