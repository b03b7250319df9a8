//! # DID Web with Verifiable History
//!
//! The `did:webvh` method is an enhanced version of the `did:web` method that
//! includes the ability to resolve a full history of the DID document through
//! a chain of updates.
//!
//! A DID's history is held in a `did.jsonl` log: one JSON object per line,
//! each a signed, hash-chained version of the DID document. The first entry
//! derives the DID's self-certifying identifier (SCID) from its own hash.
//! Anyone holding the log can recompute every hash, check every proof against
//! the keys authorized at that point, enforce key pre-rotation commitments and
//! tally witness attestations.
//!
//! This crate provides builders for creating, updating and deactivating a
//! DID, and a resolver that verifies a log and returns the document at a
//! selected version.
//!
//! See: <https://identity.foundation/didwebvh/next/>

pub mod core;
mod create;
mod deactivate;
pub mod document;
mod error;
pub mod hash;
pub mod http;
pub mod key;
pub mod log;
pub mod proof;
pub mod provider;
mod resolve;
mod update;
pub mod url;
pub mod witness;

pub use create::{CreateBuilder, CreateResult};
pub use deactivate::{DeactivateBuilder, DeactivateResult};
pub use document::{Document, DocumentBuilder, KeyPurpose, Service, VerificationMethod};
pub use error::{Error, ProofError};
pub use http::HttpClient;
pub use log::{DidLog, DidLogEntry, Parameters, VersionId, Witness, WitnessEntry, WitnessWeight};
pub use proof::Proof;
pub use provider::{Algorithm, LogResolver, Provider, Signature, WitnessClient};
pub use resolve::{Metadata, ResolveOptions, Resolved, resolve, resolve_log};
pub use update::{UpdateBuilder, UpdateResult};

#[doc(hidden)]
pub use tracing;

/// Placeholder for the self-certifying identifier (SCID) in a DID URL.
///
/// Gets replaced by the generated SCID when constructing a DID document and
/// log entry.
pub const SCID_PLACEHOLDER: &str = "{SCID}";

/// DID method name.
pub const METHOD: &str = "webvh";

/// Version of the `did:webvh` specification implemented.
pub const VERSION: &str = "0.5";

/// Contexts added to every document built by this crate.
pub const BASE_CONTEXT: [&str; 2] =
    ["https://www.w3.org/ns/did/v1", "https://w3id.org/security/multikey/v1"];

/// Result type for `did:webvh` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The `method` parameter value written to, and required of, the genesis
/// entry.
#[must_use]
pub fn method_version() -> String {
    format!("did:{METHOD}:{VERSION}")
}
