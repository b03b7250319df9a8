//! # Witnesses
//!
//! Witnesses attest to log entries by signing the entry's version id. A DID
//! configures its witnesses, each with a weight, and a threshold the weights
//! of valid witness proofs must reach for an entry to be accepted.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;

use crate::log::{DidLogEntry, Witness, WitnessEntry};
use crate::proof::{self, MethodRef, Proof};
use crate::provider::{LogResolver, Provider};
use crate::{Error, Result, tracerr};

/// Default time allowed for each witness to respond.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Validate a witness configuration.
///
/// Note: This function just validates the configuration meets structural
/// requirements. It does not verify any proofs supplied by the witnesses. See
/// [`verify_witness`] for that.
///
/// # Errors
///
/// Will fail if the witness threshold is zero, the witness list is empty, a
/// witness is not a `did:key` DID, the contribution (weight) of a witness is
/// zero, or the sum of contributions would never reach the threshold.
pub fn validate_witness(witness: &Witness) -> Result<()> {
    if witness.threshold == 0 {
        tracerr!(Error::Configuration, "witness threshold must be greater than zero");
    }
    if witness.witnesses.is_empty() {
        tracerr!(Error::Configuration, "witness list must not be empty");
    }
    let mut total_weight = 0u64;
    for w in &witness.witnesses {
        if !w.id.starts_with("did:key:") {
            tracerr!(Error::Configuration, "witness id {} must be a 'did:key' DID", w.id);
        }
        if w.weight == 0 {
            tracerr!(Error::Configuration, "weight of witness {} must be greater than zero", w.id);
        }
        total_weight = total_weight.saturating_add(w.weight);
    }
    if total_weight < witness.threshold {
        tracerr!(
            Error::Configuration,
            "total witness weight {total_weight} can never reach the threshold {}",
            witness.threshold
        );
    }
    Ok(())
}

/// Ask every configured witness for a proof over the last entry of `log`.
///
/// Witnesses are asked concurrently, each under its own `timeout`. Failed,
/// late and invalid responses are logged and skipped, so the result may hold
/// fewer proofs than there are witnesses.
pub async fn collect_proofs(
    witness: &Witness, log: &[DidLogEntry], provider: &impl Provider, timeout: Duration,
) -> Vec<Proof> {
    let Some(last) = log.last() else {
        return Vec::new();
    };

    let requests = witness.witnesses.iter().map(|w| async move {
        match tokio::time::timeout(timeout, provider.request_proof(&w.id, log)).await {
            Ok(Ok(proof)) => Some((w.id.as_str(), proof)),
            Ok(Err(e)) => {
                tracing::warn!(witness = %w.id, "witness request failed: {e}");
                None
            }
            Err(_) => {
                tracing::warn!(witness = %w.id, "witness did not respond within {timeout:?}");
                None
            }
        }
    });

    let mut proofs = Vec::new();
    for (id, proof) in join_all(requests).await.into_iter().flatten() {
        match verify_attestation(&proof, id, &last.version_id, provider, &[]).await {
            Ok(()) => proofs.push(proof),
            Err(e) => tracing::warn!(witness = %id, "discarding witness proof: {e}"),
        }
    }
    proofs
}

/// Verify witness proofs for the log entry with `version_id`.
///
/// Proofs in `entries` for other versions are ignored. Every proof for
/// `version_id` must come from a configured witness and verify. Only the
/// first proof from each witness adds its weight.
///
/// `lineage` is passed on to [`MethodRef::verifying_key`].
///
/// # Errors
///
/// Will fail if a proof for `version_id` is malformed, is not from a
/// configured witness or does not verify, and with `Error::ThresholdNotMet`
/// if the total weight of the witnesses does not reach the threshold.
pub async fn verify_witness(
    version_id: &str, entries: &[WitnessEntry], witness: &Witness, resolver: &impl LogResolver,
    lineage: &[String],
) -> Result<u64> {
    let mut counted = HashSet::new();
    let mut total_weight = 0u64;

    let proofs = entries.iter().filter(|e| e.version_id == version_id).flat_map(|e| &e.proof);
    for proof in proofs {
        let method = MethodRef::parse(&proof.verification_method)?;
        let did = method.did();
        let Some(weight) = witness.weight(did) else {
            tracerr!(Error::Authorization, "proof for {version_id} is from unknown witness {did}");
        };
        if let Err(e) = verify_attestation(proof, did, version_id, resolver, lineage).await {
            tracing::error!(witness = %did, "invalid witness proof for {version_id}: {e}");
            return Err(e);
        }
        if counted.insert(did.to_string()) {
            total_weight = total_weight.saturating_add(weight);
        }
    }

    if total_weight < witness.threshold {
        tracing::error!(
            "witness weight {total_weight} does not meet threshold {} for {version_id}",
            witness.threshold
        );
        return Err(Error::ThresholdNotMet {
            weight: total_weight,
            threshold: witness.threshold,
        });
    }
    Ok(total_weight)
}

/// Verify a single witness proof: made by `witness_id` over `version_id`.
async fn verify_attestation(
    proof: &Proof, witness_id: &str, version_id: &str, resolver: &impl LogResolver,
    lineage: &[String],
) -> Result<()> {
    proof::check_proof(proof)?;
    let method = MethodRef::parse(&proof.verification_method)?;
    if method.did() != witness_id {
        return Err(Error::Authorization(format!(
            "proof by {} is not from witness {witness_id}",
            method.did()
        )));
    }
    let key = method.verifying_key(resolver, lineage).await?;
    proof::verify_signature(proof, &json!({"versionId": version_id}), &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::WitnessWeight;

    fn witness(threshold: u64, weights: &[(&str, u64)]) -> Witness {
        Witness {
            threshold,
            witnesses: weights
                .iter()
                .map(|(id, weight)| WitnessWeight {
                    id: (*id).to_string(),
                    weight: *weight,
                })
                .collect(),
        }
    }

    #[test]
    fn valid_config() {
        validate_witness(&witness(2, &[("did:key:z6MkA", 1), ("did:key:z6MkB", 1)]))
            .expect("should be valid");
    }

    #[test]
    fn invalid_configs() {
        for config in [
            witness(0, &[("did:key:z6MkA", 1)]),
            witness(1, &[]),
            witness(1, &[("did:web:example.com", 1)]),
            witness(1, &[("did:key:z6MkA", 0)]),
            witness(3, &[("did:key:z6MkA", 1), ("did:key:z6MkB", 1)]),
        ] {
            assert!(
                matches!(validate_witness(&config), Err(Error::Configuration(_))),
                "{config:?} should be rejected"
            );
        }
    }
}
