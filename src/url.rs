//! # DID ⇄ HTTPS URL transformation
//!
//! A `did:webvh` DID has the form `did:webvh:<scid>:<host>[%3A<port>][:<path>]`.
//! The part after the SCID is the DID's *location*: it names where the
//! `did.jsonl` log is hosted.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, METHOD, Result};

static DID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^did:webvh:(?<scid>[^:]+):(?<location>[a-zA-Z0-9.\\-:%_]+)$")
        .expect("should compile")
});

/// Convert an HTTP URL into the location portion of a `did:webvh` DID.
///
/// Valid examples:
/// - `https://example.com`
/// - `http://example.com/custom/path/`
/// - `https://example.com:8080`
///
/// If the log is to be hosted on a sub-path, the path should be included.
/// Otherwise it is assumed the log is hosted at
/// `https://<host>/.well-known/did.jsonl` and you SHOULD NOT include the
/// `/.well-known` path.
///
/// # Errors
///
/// Will fail if the URL cannot be parsed or has no host.
pub fn parse_url(url: &str) -> Result<String> {
    let url = ::url::Url::parse(url)
        .map_err(|e| Error::Configuration(format!("invalid hosting URL: {e}")))?;
    let Some(host_str) = url.host_str() else {
        return Err(Error::Configuration("hosting URL has no host".into()));
    };
    let mut location = host_str.to_string();
    if let Some(port) = url.port() {
        location.push_str(&format!("%3A{port}"));
    }
    if let Some(path) = url.path().strip_prefix('/') {
        let path = path.trim_end_matches('/');
        if !path.is_empty() {
            location.push(':');
            location.push_str(&path.replace('/', ":"));
        }
    }
    Ok(location)
}

/// Assemble a DID from a SCID (or the `{SCID}` placeholder) and a location.
#[must_use]
pub fn did(scid: &str, location: &str) -> String {
    format!("did:{METHOD}:{scid}:{location}")
}

/// Split a `did:webvh` DID into its SCID and location.
///
/// # Errors
///
/// Will fail if the DID is not a syntactically valid `did:webvh` DID.
pub fn split(did: &str) -> Result<(&str, &str)> {
    let did = did.split_once('#').map_or(did, |(d, _)| d);
    let Some(caps) = DID_REGEX.captures(did) else {
        return Err(Error::Configuration(format!("{did} is not a valid did:webvh DID")));
    };
    match (caps.name("scid"), caps.name("location")) {
        (Some(scid), Some(location)) => Ok((scid.as_str(), location.as_str())),
        _ => Err(Error::Configuration(format!("{did} is not a valid did:webvh DID"))),
    }
}

/// Convert a `did:webvh` DID to the HTTPS URL of its `did.jsonl` log (default)
/// or of another file hosted alongside it, such as `did-witness.json`.
///
/// <https://identity.foundation/didwebvh/#the-did-to-https-transformation>
///
/// # Errors
///
/// Will fail if the DID is invalid.
pub fn http_url(did: &str, file_path: Option<&str>) -> Result<String> {
    // Remove the `did:webvh:` prefix and the SCID.
    let (_, location) = split(did)?;

    // Replace `:` with `/` in the location to obtain the fully qualified
    // domain name and optional path.
    let mut domain = location.replace(':', "/");

    // With no path, logs live under `/.well-known`.
    if !location.contains(':') {
        domain.push_str("/.well-known");
    }

    // A percent-encoded colon separates host and port.
    let domain = domain.replace("%3A", ":");

    let file = file_path.unwrap_or("did.jsonl");
    Ok(format!("https://{domain}/{}", file.trim_start_matches('/')))
}
