//! Tests for updating a `did:webvh` document: replacing the document,
//! rotating keys under pre-rotation and moving a portable DID.

use credibil_webvh::hash::hash_key;
use credibil_webvh::{
    CreateBuilder, CreateResult, DidLogEntry, DocumentBuilder, Error, KeyPurpose, Parameters,
    ResolveOptions, UpdateBuilder, log, resolve, resolve_log, url,
};
use test_utils::{Keyring, MockProvider};

async fn create(keyring: &Keyring, portable: bool, prerotation: bool) -> CreateResult {
    let mut builder = CreateBuilder::new()
        .url("https://credibil.io/issuers/example")
        .expect("should apply url")
        .update_keys(vec![keyring.multikey()])
        .expect("should apply update keys")
        .add_key(keyring.multikey(), KeyPurpose::Authentication)
        .portable(portable);
    if prerotation {
        builder = builder.next_key(&keyring.next_multikey());
    }
    builder.build(keyring, &MockProvider::new()).await.expect("should create DID")
}

// Test the happy path of updating the DID document. Should just work without
// errors.
#[tokio::test]
async fn update_success() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, false).await;

    let new_key = Keyring::new().multikey();
    let document = DocumentBuilder::from(&created.document)
        .add_key(&new_key, KeyPurpose::AssertionMethod)
        .build();

    let updated = UpdateBuilder::from(&created.log, None, &provider)
        .await
        .expect("should load log")
        .document(&document)
        .ttl(60)
        .signer(&keyring)
        .build(&provider)
        .await
        .expect("should update DID");

    assert_eq!(updated.did, created.did);
    assert_eq!(updated.log.len(), 2);
    assert!(updated.log[1].version_id.starts_with("2-"));
    assert_eq!(updated.metadata.version_number, 2);
    assert_eq!(updated.metadata.created, created.metadata.created);
    assert_eq!(updated.metadata.ttl, Some(60));

    let fragment = &new_key[new_key.len() - 8..];
    assert!(updated.document.verification_method(&format!("#{fragment}")).is_some());

    // Only changed parameters are written.
    assert_eq!(
        updated.log[1].parameters,
        Parameters {
            ttl: Some(60),
            ..Parameters::default()
        }
    );

    let resolved = resolve_log(&updated.log, None, &ResolveOptions::default(), &provider)
        .await
        .expect("should resolve");
    assert_eq!(resolved.document, updated.document);
    assert_eq!(resolved.metadata, updated.metadata);
}

// The new update keys must have been committed to and the entry is signed by
// the outgoing key. The incoming key then signs the following entry.
#[tokio::test]
async fn rotate_keys() {
    let mut keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, true).await;

    let previous = keyring.clone();
    keyring.rotate();

    let rotated = UpdateBuilder::from(&created.log, None, &provider)
        .await
        .expect("should load log")
        .rotate_keys(&[keyring.multikey().as_str()], &[keyring.next_multikey().as_str()])
        .signer(&previous)
        .build(&provider)
        .await
        .expect("should rotate keys");
    assert_eq!(rotated.metadata.update_keys, vec![keyring.multikey()]);
    assert!(rotated.metadata.prerotation);

    // The outgoing key can no longer sign.
    let err = UpdateBuilder::from(&rotated.log, None, &provider)
        .await
        .expect("should load log")
        .signer(&previous)
        .build(&provider)
        .await
        .expect_err("outgoing key should be rejected");
    assert!(matches!(err, Error::Authorization(_)));

    let updated = UpdateBuilder::from(&rotated.log, None, &provider)
        .await
        .expect("should load log")
        .ttl(300)
        .signer(&keyring)
        .build(&provider)
        .await
        .expect("should update with incoming key");
    resolve_log(&updated.log, None, &ResolveOptions::default(), &provider)
        .await
        .expect("should resolve");
}

#[tokio::test]
async fn rotate_uncommitted_key() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, true).await;

    let rogue = Keyring::new();
    let err = UpdateBuilder::from(&created.log, None, &provider)
        .await
        .expect("should load log")
        .rotate_keys(&[rogue.multikey().as_str()], &[rogue.next_multikey().as_str()])
        .signer(&keyring)
        .build(&provider)
        .await
        .expect_err("should reject uncommitted key");
    assert!(matches!(err, Error::Authorization(_)));
}

#[tokio::test]
async fn rotate_without_commitment() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, true).await;

    let err = UpdateBuilder::from(&created.log, None, &provider)
        .await
        .expect("should load log")
        .update_keys(vec![keyring.next_multikey()])
        .signer(&keyring)
        .build(&provider)
        .await
        .expect_err("should require next key hashes");
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn move_not_portable() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, false).await;

    let builder =
        UpdateBuilder::from(&created.log, None, &provider).await.expect("should load log");
    let Err(err) = builder.move_to("https://elsewhere.io") else {
        panic!("move should be rejected");
    };
    assert!(matches!(err, Error::Policy(_)));
}

#[tokio::test]
async fn move_portable() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, true, false).await;
    let scid = &created.metadata.scid;

    let moved = UpdateBuilder::from(&created.log, None, &provider)
        .await
        .expect("should load log")
        .move_to("https://elsewhere.io/dids")
        .expect("should accept new location")
        .signer(&keyring)
        .build(&provider)
        .await
        .expect("should move DID");

    assert_eq!(moved.did, format!("did:webvh:{scid}:elsewhere.io:dids"));
    assert_eq!(moved.document.id, moved.did);
    assert_eq!(moved.document.also_known_as, Some(vec![created.did.clone()]));
    let mut vms = moved.document.verification_method.iter().flatten();
    assert!(vms.all(|vm| vm.id.starts_with(&moved.did)));
    assert_eq!(moved.metadata.scid, *scid);

    let resolved = resolve_log(&moved.log, None, &ResolveOptions::default(), &provider)
        .await
        .expect("should resolve");
    assert_eq!(resolved.did, moved.did);
}

#[tokio::test]
async fn enable_portability_rejected() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, false).await;

    let err = UpdateBuilder::from(&created.log, None, &provider)
        .await
        .expect("should load log")
        .portable(true)
        .signer(&keyring)
        .build(&provider)
        .await
        .expect_err("should reject enabling portability");
    assert!(matches!(err, Error::Policy(_)));
}

// Once moved, the new DID resolves its whole history. Versions from before
// the move carry the DID they were published under.
#[tokio::test]
async fn resolve_moved_history() {
    let keyring = Keyring::new();
    let created = create(&keyring, true, false).await;

    let moved = UpdateBuilder::from(&created.log, None, &MockProvider::new())
        .await
        .expect("should load log")
        .move_to("https://elsewhere.io")
        .expect("should accept new location")
        .signer(&keyring)
        .build(&MockProvider::new())
        .await
        .expect("should move DID");

    let log_url = url::http_url(&moved.did, None).expect("should get url");
    let jsonl = log::to_jsonl(&moved.log).expect("should serialize log");
    let provider = MockProvider::new().with_log(log_url, jsonl);

    let options = ResolveOptions {
        version_number: Some(1),
        ..ResolveOptions::default()
    };
    let resolved = resolve(&moved.did, &options, &provider).await.expect("should resolve");
    assert_eq!(resolved.did, created.did);
    assert_eq!(resolved.metadata.version_number, 1);

    let resolved = resolve(&moved.did, &ResolveOptions::default(), &provider)
        .await
        .expect("should resolve");
    assert_eq!(resolved.did, moved.did);
}

// The entry after `previous`, hashed but not signed.
fn next_entry(previous: &DidLogEntry, parameters: Parameters) -> DidLogEntry {
    let mut entry = DidLogEntry {
        version_id: previous.version_id.clone(),
        version_time: previous.version_time,
        parameters,
        state: previous.state.clone(),
        proof: Vec::new(),
    };
    let number = previous.version().expect("should parse version").number + 1;
    entry.version_id = format!("{number}-{}", entry.hash().expect("should hash"));
    entry
}

// Resolution enforces the pre-rotation commitment on hand-built entries.
#[tokio::test]
async fn resolve_uncommitted_rotation() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, true).await;

    let rogue = Keyring::new();
    let mut entry = next_entry(
        &created.log[0],
        Parameters {
            update_keys: Some(vec![rogue.multikey()]),
            next_key_hashes: Some(vec![hash_key(&rogue.next_multikey())]),
            ..Parameters::default()
        },
    );
    entry.sign(&keyring).await.expect("should sign");

    let mut log = created.log.clone();
    log.push(entry);
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should reject uncommitted key");
    assert!(matches!(err, Error::Authorization(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn resolve_rotation_without_commitment() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, true).await;

    let mut entry = next_entry(
        &created.log[0],
        Parameters {
            update_keys: Some(vec![keyring.next_multikey()]),
            ..Parameters::default()
        },
    );
    entry.sign(&keyring).await.expect("should sign");

    let mut log = created.log.clone();
    log.push(entry);
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should require next key hashes");
    assert!(matches!(err, Error::Integrity(_)), "unexpected error: {err}");
}

// An entry signed by a key that is not an update key is rejected.
#[tokio::test]
async fn resolve_foreign_signer() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, false).await;

    let mut entry = next_entry(
        &created.log[0],
        Parameters {
            ttl: Some(60),
            ..Parameters::default()
        },
    );
    entry.sign(&Keyring::new()).await.expect("should sign");

    let mut log = created.log.clone();
    log.push(entry);
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should reject foreign signer");
    assert!(matches!(err, Error::Authorization(_)), "unexpected error: {err}");
}

// A hand-built entry that moves a non-portable DID is rejected on
// resolution even though it is correctly hashed and signed.
#[tokio::test]
async fn resolve_unauthorized_move() {
    let keyring = Keyring::new();
    let provider = MockProvider::new();
    let created = create(&keyring, false, false).await;
    let genesis = &created.log[0];

    let moved_did = format!("did:webvh:{}:elsewhere.io", created.metadata.scid);
    let mut state = serde_json::to_value(&genesis.state).expect("should serialize");
    log::substitute(&mut state, &created.did, &moved_did);

    let mut entry = DidLogEntry {
        version_id: genesis.version_id.clone(),
        version_time: genesis.version_time,
        parameters: Parameters::default(),
        state: serde_json::from_value(state).expect("should deserialize"),
        proof: Vec::new(),
    };
    entry.version_id = format!("2-{}", entry.hash().expect("should hash"));
    entry.sign(&keyring).await.expect("should sign");

    let mut log = created.log.clone();
    log.push(entry);
    let err = resolve_log(&log, None, &ResolveOptions::default(), &provider)
        .await
        .expect_err("should reject move");
    assert!(matches!(err, Error::Policy(_)), "unexpected error: {err}");
}
