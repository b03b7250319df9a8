//! # Data Integrity Proofs
//!
//! Log entries are signed with `eddsa-jcs-2022` Data Integrity Proofs. The
//! signature covers `SHA-256(JCS(proof options)) ‖ SHA-256(JCS(subject))`
//! where the proof options are the proof without its `proofValue`.
//!
//! The subject of a controller's proof is the log entry without proofs. The
//! subject of a witness's proof is `{"versionId": <version id>}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use futures::future::{BoxFuture, FutureExt, try_join_all};
use multibase::Base;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::hash::digest;
use crate::log::{DidLogEntry, Witness};
use crate::provider::{Algorithm, LogResolver, Signature};
use crate::resolve::{Resolved, resolve_nested};
use crate::{Error, ProofError, Result, key};

/// Proof `type`.
pub const PROOF_TYPE: &str = "DataIntegrityProof";

/// Proof `cryptosuite`.
pub const CRYPTOSUITE: &str = "eddsa-jcs-2022";

/// Proof purpose used for proofs created here.
pub const PROOF_PURPOSE: &str = "assertionMethod";

/// A Data Integrity Proof.
///
/// <https://www.w3.org/TR/vc-data-integrity/#proofs>
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// Optional identifier for the proof, usually a `urn:uuid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Proof type, `DataIntegrityProof`.
    #[serde(rename = "type")]
    pub type_: String,

    /// Cryptographic suite used to create the proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptosuite: Option<String>,

    /// The verification method used to create the proof: a DID URL.
    pub verification_method: String,

    /// When the proof was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// The reason the proof was created, `authentication` or
    /// `assertionMethod`.
    pub proof_purpose: String,

    /// The multibase-encoded signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_value: Option<String>,

    /// Any other proof properties. These are covered by the signature.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Create a proof over `subject` with the signer's key.
///
/// # Errors
///
/// Will fail if the signer's algorithm is not `EdDSA`, the signer fails, or
/// the subject cannot be serialized.
pub async fn create_proof<T: Serialize + Sync>(
    subject: &T, signer: &impl Signature,
) -> Result<Proof> {
    if signer.algorithm() != Algorithm::EdDSA {
        return Err(Error::Unsupported("signing algorithm must be Ed25519 (pure EdDSA)".into()));
    }
    let verification_method = signer.verification_method().await?;

    let mut proof = Proof {
        id: Some(format!("urn:uuid:{}", Uuid::new_v4())),
        type_: PROOF_TYPE.to_string(),
        cryptosuite: Some(CRYPTOSUITE.to_string()),
        verification_method,
        created: Some(crate::log::now()),
        proof_purpose: PROOF_PURPOSE.to_string(),
        ..Proof::default()
    };
    let payload = payload(&proof, subject)?;
    let signature = signer.try_sign(&payload).await?;
    proof.proof_value = Some(multibase::encode(Base::Base58Btc, signature));
    Ok(proof)
}

/// Create a witness's proof attesting to the log entry with `version_id`.
///
/// # Errors
///
/// Will fail if the signer's algorithm is not `EdDSA` or the signer fails.
pub async fn witness_proof(version_id: &str, signer: &impl Signature) -> Result<Proof> {
    create_proof(&json!({"versionId": version_id}), signer).await
}

/// Check the proof's type, cryptosuite and purpose.
///
/// # Errors
///
/// Will fail with the matching `ProofError` if any is unsupported.
pub fn check_proof(proof: &Proof) -> Result<(), ProofError> {
    if proof.type_ != PROOF_TYPE {
        return Err(ProofError::UnsupportedProofType(proof.type_.clone()));
    }
    if proof.cryptosuite.as_deref() != Some(CRYPTOSUITE) {
        return Err(ProofError::UnsupportedCryptosuite(
            proof.cryptosuite.clone().unwrap_or_default(),
        ));
    }
    if proof.proof_purpose != "authentication" && proof.proof_purpose != "assertionMethod" {
        return Err(ProofError::UnsupportedPurpose(proof.proof_purpose.clone()));
    }
    Ok(())
}

/// Verify the proof's signature over `subject` with `key`.
///
/// # Errors
///
/// Will fail if the proof value is missing or malformed, or the signature
/// does not verify.
pub fn verify_signature(proof: &Proof, subject: &Value, key: &VerifyingKey) -> Result<()> {
    let Some(proof_value) = &proof.proof_value else {
        return Err(ProofError::MissingValue.into());
    };
    let (base, bytes) = multibase::decode(proof_value)
        .map_err(|e| ProofError::InvalidSignature(e.to_string()))?;
    if base != Base::Base58Btc {
        return Err(ProofError::InvalidSignature("proof value must be base58btc".into()).into());
    }
    let signature = Ed25519Signature::from_slice(&bytes)
        .map_err(|e| ProofError::InvalidSignature(e.to_string()))?;

    let mut options = proof.clone();
    options.proof_value = None;
    let payload = payload(&options, subject)?;
    key.verify(&payload, &signature)
        .map_err(|_| ProofError::InvalidSignature(proof.verification_method.clone()).into())
}

fn payload<T: Serialize>(options: &Proof, subject: &T) -> Result<Vec<u8>> {
    let options_hash = digest(options)?;
    let subject_hash = digest(subject)?;
    Ok([options_hash.as_slice(), subject_hash.as_slice()].concat())
}

/// A proof's verification method, classified by DID method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodRef {
    /// A `did:key` URL. The key is embedded in the DID.
    DidKey {
        /// The DID, without fragment.
        did: String,

        /// The multikey embedded in the DID.
        multikey: String,
    },

    /// A `did:webvh` URL. The key is found by resolving the DID's log.
    WebVh {
        /// The DID, without fragment.
        did: String,

        /// The full verification method URL.
        url: String,
    },
}

/// The capacity in which a proof was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Signed by a current update key.
    Controller,

    /// Signed by a configured witness.
    Witness,
}

impl MethodRef {
    /// Classify a verification method URL.
    ///
    /// # Errors
    ///
    /// Will fail with `ProofError::UnsupportedVerificationMethod` for any
    /// method other than `did:key` or `did:webvh`.
    pub fn parse(verification_method: &str) -> Result<Self, ProofError> {
        let did = verification_method.split_once('#').map_or(verification_method, |(d, _)| d);
        if did.starts_with("did:key:") {
            let Some(multikey) = key::multikey_from_did(did) else {
                return Err(ProofError::UnsupportedVerificationMethod(
                    verification_method.to_string(),
                ));
            };
            return Ok(Self::DidKey {
                did: did.to_string(),
                multikey: multikey.to_string(),
            });
        }
        if did.starts_with("did:webvh:") && verification_method.contains('#') {
            return Ok(Self::WebVh {
                did: did.to_string(),
                url: verification_method.to_string(),
            });
        }
        Err(ProofError::UnsupportedVerificationMethod(verification_method.to_string()))
    }

    /// The DID of the verification method, without fragment.
    #[must_use]
    pub fn did(&self) -> &str {
        match self {
            Self::DidKey { did, .. } | Self::WebVh { did, .. } => did,
        }
    }

    /// Determine whether the method signs as a controller (its key is an
    /// authorized update key) or as a configured witness.
    ///
    /// # Errors
    ///
    /// Will fail with `Error::Authorization` if it is neither.
    pub fn role(&self, update_keys: &[String], witness: Option<&Witness>) -> Result<Role> {
        if let Self::DidKey { multikey, .. } = self {
            if update_keys.contains(multikey) {
                return Ok(Role::Controller);
            }
        }
        if witness.is_some_and(|w| w.weight(self.did()).is_some()) {
            return Ok(Role::Witness);
        }
        Err(Error::Authorization(format!(
            "{} is not an authorized update key or witness",
            self.did()
        )))
    }

    /// Resolve the public key of the verification method.
    ///
    /// `lineage` holds the SCIDs of the logs whose verification led to this
    /// lookup, outermost first. It is empty outside of log verification.
    ///
    /// # Errors
    ///
    /// Will fail if the key cannot be found or is not an Ed25519 multikey, or
    /// if a `did:webvh` method refers back to a log in `lineage`.
    pub async fn verifying_key(
        &self, resolver: &impl LogResolver, lineage: &[String],
    ) -> Result<VerifyingKey> {
        match self {
            Self::DidKey { multikey, .. } => key::decode_multikey(multikey),
            Self::WebVh { did, url } => {
                let resolved = resolve_boxed(did, resolver, lineage).await?;
                let Some(vm) = resolved.document.verification_method(url) else {
                    return Err(Error::NotFound(format!("verification method {url} not found")));
                };
                let Some(multikey) = &vm.public_key_multibase else {
                    return Err(ProofError::KeyFormat(format!("{url} has no publicKeyMultibase"))
                        .into());
                };
                key::decode_multikey(multikey)
            }
        }
    }
}

// Resolving a `did:webvh` verification method resolves another log, whose
// proofs may in turn reference `did:webvh` methods.
fn resolve_boxed<'a, R: LogResolver>(
    did: &'a str, resolver: &'a R, lineage: &'a [String],
) -> BoxFuture<'a, Result<Resolved>> {
    async move { resolve_nested(did, resolver, lineage).await }.boxed()
}

/// Verify the proofs on a log entry.
///
/// Controller proofs must be made by one of `update_keys` and sign the entry
/// without proofs. Witness proofs must be made by a witness in `witness` and
/// sign the entry's version id. At least one controller proof is required
/// and every proof must verify.
///
/// `lineage` is passed on to [`MethodRef::verifying_key`].
///
/// # Errors
///
/// Will fail on the first proof that is malformed, unauthorized or does not
/// verify.
pub async fn verify_proofs(
    entry: &DidLogEntry, update_keys: &[String], witness: Option<&Witness>,
    resolver: &impl LogResolver, lineage: &[String],
) -> Result<()> {
    if entry.proof.is_empty() {
        return Err(ProofError::Missing.into());
    }

    let unsigned = serde_json::to_value(entry.unsigned())?;
    let attestation = json!({"versionId": entry.version_id});

    let mut checks = Vec::with_capacity(entry.proof.len());
    let mut controllers = 0;
    for proof in &entry.proof {
        check_proof(proof)?;
        let method = MethodRef::parse(&proof.verification_method)?;
        let subject = match method.role(update_keys, witness)? {
            Role::Controller => {
                controllers += 1;
                &unsigned
            }
            Role::Witness => &attestation,
        };
        checks.push(async move {
            let key = method.verifying_key(resolver, lineage).await?;
            verify_signature(proof, subject, &key)
        });
    }
    if controllers == 0 {
        return Err(Error::Authorization(format!(
            "log entry {} has no proof from an authorized update key",
            entry.version_id
        )));
    }

    try_join_all(checks).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;

    struct TestSigner(SigningKey);

    impl Signature for TestSigner {
        async fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.sign(msg).to_bytes().to_vec())
        }

        async fn verifying_key(&self) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.verifying_key().to_bytes().to_vec())
        }

        fn algorithm(&self) -> Algorithm {
            Algorithm::EdDSA
        }
    }

    #[tokio::test]
    async fn sign_and_verify() {
        let signer = TestSigner(SigningKey::from_bytes(&[7u8; 32]));
        let proof = witness_proof("1-zHash", &signer).await.expect("should sign");
        check_proof(&proof).expect("should be well formed");

        let method = MethodRef::parse(&proof.verification_method).expect("should parse");
        let MethodRef::DidKey { multikey, .. } = &method else {
            panic!("should be did:key");
        };
        let key = key::decode_multikey(multikey).expect("should decode");

        verify_signature(&proof, &json!({"versionId": "1-zHash"}), &key).expect("should verify");

        let Err(Error::Verification(ProofError::InvalidSignature(_))) =
            verify_signature(&proof, &json!({"versionId": "2-zHash"}), &key)
        else {
            panic!("should reject a different subject");
        };
    }

    #[test]
    fn classify_methods() {
        let key = MethodRef::parse("did:key:z6MkA#z6MkA").expect("should parse");
        assert_eq!(key.did(), "did:key:z6MkA");
        let role = key.role(&["z6MkA".to_string()], None).expect("should authorize");
        assert_eq!(role, Role::Controller);

        let webvh = MethodRef::parse("did:webvh:zScid:example.com#key-1").expect("should parse");
        assert_eq!(webvh.did(), "did:webvh:zScid:example.com");
        let witness = Witness {
            threshold: 1,
            witnesses: vec![crate::WitnessWeight {
                id: "did:webvh:zScid:example.com".to_string(),
                weight: 1,
            }],
        };
        assert_eq!(webvh.role(&[], Some(&witness)).expect("should authorize"), Role::Witness);
        assert!(matches!(webvh.role(&[], None), Err(Error::Authorization(_))));

        assert_eq!(
            MethodRef::parse("did:web:example.com#key-1"),
            Err(ProofError::UnsupportedVerificationMethod("did:web:example.com#key-1".into()))
        );
    }

    #[test]
    fn proof_shape() {
        let proof = Proof {
            type_: PROOF_TYPE.to_string(),
            cryptosuite: Some("ecdsa-jcs-2019".to_string()),
            proof_purpose: PROOF_PURPOSE.to_string(),
            ..Proof::default()
        };
        assert_eq!(
            check_proof(&proof),
            Err(ProofError::UnsupportedCryptosuite("ecdsa-jcs-2019".into()))
        );
    }
}
