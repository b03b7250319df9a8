//! Tests for resolving a `did:webvh` log: hash chain and ordering checks,
//! version selection and fetching the log from its hosting URL.

use chrono::{DateTime, Duration, TimeZone, Utc};
use credibil_webvh::{
    CreateBuilder, DidLogEntry, DocumentBuilder, Error, KeyPurpose, ResolveOptions, UpdateBuilder,
    log, resolve, resolve_log, url,
};
use serde_json::json;
use test_utils::{Keyring, MockProvider};

fn time(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("should be valid time")
        + Duration::seconds(secs)
}

// Create a DID at `t = 0` and update it at `t = 100` and `t = 200`, adding a
// key each time.
async fn three_versions(keyring: &Keyring, provider: &MockProvider) -> Vec<DidLogEntry> {
    let created = CreateBuilder::new()
        .url("https://example.com/dids/alice")
        .expect("should apply url")
        .update_keys(vec![keyring.multikey()])
        .expect("should apply update keys")
        .add_key(keyring.multikey(), KeyPurpose::Authentication)
        .version_time(time(0))
        .build(keyring, provider)
        .await
        .expect("should create DID");

    let mut log = created.log;
    let mut document = created.document;
    for t in [100, 200] {
        document = DocumentBuilder::from(&document)
            .add_key(Keyring::new().multikey(), KeyPurpose::AssertionMethod)
            .build();
        let updated = UpdateBuilder::from(&log, None, provider)
            .await
            .expect("should load log")
            .document(&document)
            .version_time(time(t))
            .signer(keyring)
            .build(provider)
            .await
            .expect("should update DID");
        log = updated.log;
    }
    log
}

#[tokio::test]
async fn resolve_latest() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let log = three_versions(&keyring, &provider).await;

    let resolved = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect("should resolve");
    assert_eq!(resolved.metadata.version_number, 3);
    assert_eq!(resolved.metadata.version_id, log[2].version_id);
    assert_eq!(resolved.metadata.created, time(0));
    assert_eq!(resolved.metadata.updated, time(200));
    assert_eq!(resolved.document, log[2].state);

    // Resolution is deterministic.
    let again = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect("should resolve");
    assert_eq!(again, resolved);
}

#[tokio::test]
async fn resolve_by_version() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let log = three_versions(&keyring, &provider).await;

    let options = ResolveOptions {
        version_number: Some(2),
        ..ResolveOptions::default()
    };
    let resolved = resolve_log(&log, None, &options, &provider).await.expect("should resolve");
    assert_eq!(resolved.metadata.version_id, log[1].version_id);

    let options = ResolveOptions {
        version_id: Some(log[0].version_id.clone()),
        ..ResolveOptions::default()
    };
    let resolved = resolve_log(&log, None, &options, &provider).await.expect("should resolve");
    assert_eq!(resolved.metadata.version_number, 1);

    let options = ResolveOptions {
        version_number: Some(4),
        ..ResolveOptions::default()
    };
    let err = resolve_log(&log, None, &options, &provider).await.expect_err("should not find");
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn resolve_by_time() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let log = three_versions(&keyring, &provider).await;

    for (t, expected) in [(0, 1), (99, 1), (150, 2), (500, 3)] {
        let options = ResolveOptions {
            version_time: Some(time(t)),
            ..ResolveOptions::default()
        };
        let resolved = resolve_log(&log, None, &options, &provider).await.expect("should resolve");
        assert_eq!(resolved.metadata.version_number, expected, "at t = {t}");
    }

    let options = ResolveOptions {
        version_time: Some(time(-1)),
        ..ResolveOptions::default()
    };
    let err = resolve_log(&log, None, &options, &provider).await.expect_err("should not find");
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn resolve_by_verification_method() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let log = three_versions(&keyring, &provider).await;

    // The key added by the last update first appears in version 3.
    let added = log[2]
        .state
        .verification_method
        .as_ref()
        .and_then(|vms| vms.last())
        .map(|vm| vm.id.clone())
        .expect("should have a key");
    let options = ResolveOptions {
        verification_method: Some(added),
        ..ResolveOptions::default()
    };
    let resolved = resolve_log(&log, None, &options, &provider).await.expect("should resolve");
    assert_eq!(resolved.metadata.version_number, 3);
}

#[tokio::test]
async fn selector_conflict() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let log = three_versions(&keyring, &provider).await;

    let options = ResolveOptions {
        version_number: Some(1),
        version_time: Some(time(0)),
        ..ResolveOptions::default()
    };
    let err = resolve_log(&log, None, &options, &provider).await.expect_err("should conflict");
    assert!(matches!(err, Error::Configuration(_)));
}

// Changing any field of a signed entry breaks the hash chain.
#[tokio::test]
async fn tampered_entry() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let mut log = three_versions(&keyring, &provider).await;

    log[1].state.additional.insert("tampered".to_string(), json!(true));
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should detect tampering");
    assert!(matches!(err, Error::Integrity(_)), "unexpected error: {err}");

    // Selecting an earlier version still verifies.
    let options = ResolveOptions {
        version_number: Some(1),
        ..ResolveOptions::default()
    };
    resolve_log(&log, None, &options, &provider).await.expect("should resolve version 1");
}

// A first entry whose SCID is not the hash of the entry is rejected.
#[tokio::test]
async fn scid_mismatch() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let mut log = three_versions(&keyring, &provider).await;

    log[0].parameters.ttl = Some(60);
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should detect SCID mismatch");
    assert!(matches!(err, Error::Integrity(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn out_of_order() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let mut log = three_versions(&keyring, &provider).await;

    log.swap(1, 2);
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should reject order");
    assert!(matches!(
        err,
        Error::OutOfOrder {
            expected: 2,
            found: 3
        }
    ));
}

// An entry without proofs is rejected.
#[tokio::test]
async fn missing_proof() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let mut log = three_versions(&keyring, &provider).await;

    log[2].proof.clear();
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should require a proof");
    assert!(matches!(err, Error::Verification(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn unsupported_method() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let mut log = three_versions(&keyring, &provider).await;

    log[0].parameters.method = Some("did:webvh:0.1".to_string());
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should reject method");
    assert!(matches!(err, Error::Unsupported(_)));
}

// Resolve a DID by fetching its log from the hosting URL.
#[tokio::test]
async fn resolve_did() {
    let keyring = Keyring::new();
    let log = three_versions(&keyring, &MockProvider::new()).await;
    let did = log[2].state.id.clone();

    let log_url = url::http_url(&did, None).expect("should get url");
    assert_eq!(log_url, "https://example.com/dids/alice/did.jsonl");
    let jsonl = log::to_jsonl(&log).expect("should serialize log");
    let provider = MockProvider::new().with_log(log_url, jsonl);

    let resolved =
        resolve(&did, &ResolveOptions::default(), &provider).await.expect("should resolve DID");
    assert_eq!(resolved.did, did);
    assert_eq!(resolved.metadata.version_number, 3);

    // A DID URL resolves to its DID's document.
    let vm = &log[2].state.verification_method.as_ref().expect("should have keys")[0].id;
    let resolved =
        resolve(vm, &ResolveOptions::default(), &provider).await.expect("should resolve DID URL");
    assert_eq!(resolved.did, did);

    // Unhosted logs cannot be fetched.
    let err = resolve(&did, &ResolveOptions::default(), &MockProvider::new())
        .await
        .expect_err("should fail to fetch");
    assert!(matches!(err, Error::Network(_)));
}
