//! # Errors
//!
//! Error types returned by `did:webvh` operations. Every failure aborts the
//! operation in progress: resolution never returns a partially verified
//! document.

use thiserror::Error;

/// Log the error and return it from the enclosing function.
///
/// # Example
/// ```
/// use credibil_webvh::{Error, Result, tracerr};
///
/// fn check(n: u64) -> Result<()> {
///     if n == 0 {
///         tracerr!(Error::Configuration, "value must be non-zero: {n}");
///     }
///     Ok(())
/// }
///
/// assert!(check(0).is_err());
/// ```
#[macro_export]
macro_rules! tracerr {
    ($variant:path, $($msg:tt)*) => {{
        let msg = format!($($msg)*);
        $crate::tracing::error!("{msg}");
        return Err($variant(msg));
    }};
}

/// Public error type for `did:webvh` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied invalid input or conflicting options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The log failed an integrity check: a broken hash chain, SCID mismatch
    /// or a missing key commitment.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A log entry's version number is not the next in sequence.
    #[error("version out of order: expected {expected}, found {found}")]
    OutOfOrder {
        /// The version number expected at this position.
        expected: u64,

        /// The version number found in the log entry.
        found: u64,
    },

    /// A key is not authorized for the operation or is not in the committed
    /// set of next keys.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// A proof failed verification.
    #[error("verification error: {0}")]
    Verification(#[from] ProofError),

    /// The log uses a method version or feature that is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation is disallowed by the DID's policy, such as moving a
    /// non-portable DID.
    #[error("policy error: {0}")]
    Policy(String),

    /// The verified witness weight did not reach the configured threshold.
    #[error("witness threshold not met: got {weight}, need {threshold}")]
    ThresholdNotMet {
        /// Total weight of verified witness proofs.
        weight: u64,

        /// Configured threshold.
        threshold: u64,
    },

    /// The requested version was not found in the log.
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator failed to fetch a remote log or witness proof.
    #[error("network error: {0}")]
    Network(String),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An error raised by a collaborator such as a signer.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reasons a Data Integrity Proof can fail verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The log entry carries no proof.
    #[error("log entry has no proof")]
    Missing,

    /// The proof `type` is not `DataIntegrityProof`.
    #[error("unsupported proof type {0} - must be 'DataIntegrityProof'")]
    UnsupportedProofType(String),

    /// The proof `cryptosuite` is not `eddsa-jcs-2022`.
    #[error("unsupported cryptosuite {0} - must be 'eddsa-jcs-2022'")]
    UnsupportedCryptosuite(String),

    /// The proof purpose is not `authentication` or `assertionMethod`.
    #[error("unsupported proof purpose {0} - must be 'authentication' or 'assertionMethod'")]
    UnsupportedPurpose(String),

    /// The verification method is neither a `did:key` nor a `did:webvh` URL.
    #[error("unsupported verification method {0}")]
    UnsupportedVerificationMethod(String),

    /// The public key is not a multibase-encoded Ed25519 multikey.
    #[error("invalid key format: {0}")]
    KeyFormat(String),

    /// The proof has no `proofValue`.
    #[error("proof value is missing")]
    MissingValue,

    /// The signature does not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<multibase::Error> for Error {
    fn from(err: multibase::Error) -> Self {
        Self::Verification(ProofError::KeyFormat(err.to_string()))
    }
}

impl Error {
    /// Returns a short machine-readable code for the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Integrity(_) => "integrity_error",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::Authorization(_) => "authorization_error",
            Self::Verification(_) => "verification_error",
            Self::Unsupported(_) => "unsupported",
            Self::Policy(_) => "policy_error",
            Self::ThresholdNotMet { .. } => "threshold_not_met",
            Self::NotFound(_) => "not_found",
            Self::Network(_) => "network_error",
            Self::Serialization(_) => "serialization_error",
            Self::Other(_) => "unknown",
        }
    }

    /// Transfer the error to a JSON object suitable for an HTTP error
    /// response body.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "error_description": self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Result;

    #[test]
    fn to_json() {
        let err = Error::Integrity("hash chain broken at version 2".into());
        assert_eq!(
            err.to_json(),
            json!({
                "error": "integrity_error",
                "error_description": "integrity error: hash chain broken at version 2"
            })
        );
    }

    #[test]
    fn proof_error_converts() {
        let err: Error = ProofError::MissingValue.into();
        assert!(matches!(err, Error::Verification(ProofError::MissingValue)));
        assert_eq!(err.code(), "verification_error");
    }

    #[test]
    fn tracerr_returns() {
        fn run() -> Result<()> {
            tracerr!(Error::Policy, "cannot move {}", "did");
        }
        let Err(e) = run() else {
            panic!("expected error");
        };
        assert_eq!(e.to_string(), "policy error: cannot move did");
    }
}
