//! Integration tests for live key rotation
//!
//! A file-backed key store shared between the key manager and the token
//! codec, driven through a full generate / rotate / cleanup cycle.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use keyward_config::TokenConfig;
use keyward_keys::{
    derive_key_id, init_key_manager, CleanupOutcome, KeyManager, SharedKeyManager,
    SigningAlgorithm,
};
use keyward_token::{Claims, InvalidKind, TokenCodec, TokenError};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn payload(sub: &str, role: &str) -> Claims {
    json!({ "sub": sub, "role": role }).as_object().cloned().unwrap()
}

fn header_kid(token: &str) -> String {
    let segment = token.split('.').next().unwrap();
    let header: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap();
    header["kid"].as_str().unwrap().to_string()
}

/// Manager on a fresh store with one active key; returns the key's secret
fn bootstrap(dir: &TempDir) -> (SharedKeyManager, String) {
    let path = dir.path().join("keys.json");
    let manager = init_key_manager(path.to_str());
    let secret = {
        let mut keys = manager.write().unwrap();
        let (secret, key_id) = keys.generate(SigningAlgorithm::HS256, 64).unwrap();
        keys.activate(&key_id).unwrap();
        secret
    };
    (manager, secret)
}

#[test]
fn test_rotation_lifecycle() {
    let dir = TempDir::new().unwrap();
    let (manager, first_secret) = bootstrap(&dir);
    let config = TokenConfig::new(first_secret);
    let codec = TokenCodec::with_key_manager(config.clone(), manager.clone()).unwrap();

    let token = codec
        .create(&payload("alice", "admin"), Some(chrono::Duration::minutes(30)), None)
        .unwrap();
    let claims = codec.verify(&token).unwrap();
    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["role"], "admin");
    assert!(matches!(codec.verify(""), Err(TokenError::Invalid(_))));

    // Rotate: the store now has a new active key, the old one is retained
    let (second_secret, second_id) = manager
        .write()
        .unwrap()
        .rotate(SigningAlgorithm::HS256, 64)
        .unwrap();
    let rotated =
        TokenCodec::with_key_manager(config.rotated(second_secret), manager.clone()).unwrap();

    assert_eq!(rotated.verify(&token).unwrap()["sub"], "alice");
    assert!(codec.verify(&token).is_ok());

    let fresh = rotated.create(&payload("bob", "user"), None, None).unwrap();
    assert_eq!(header_kid(&fresh), second_id);
    assert!(rotated.verify(&fresh).is_ok());

    // Cleanup removes the previous key; its tokens stop verifying
    let outcome = manager.write().unwrap().cleanup(0, false).unwrap();
    assert_eq!(outcome, CleanupOutcome::Removed(1));

    match rotated.verify(&token) {
        Err(TokenError::Invalid(e)) => assert_eq!(e.kind(), InvalidKind::UnknownKey),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(rotated.verify(&fresh).is_ok());
}

#[test]
fn test_kid_names_signing_secret_after_store_rotation() {
    let dir = TempDir::new().unwrap();
    let (manager, first_secret) = bootstrap(&dir);
    let first_id = derive_key_id(&first_secret);
    let codec =
        TokenCodec::with_key_manager(TokenConfig::new(first_secret.clone()), manager.clone())
            .unwrap();

    // The store moves on while this codec still signs with the first secret
    let (_, second_id) = manager
        .write()
        .unwrap()
        .rotate(SigningAlgorithm::HS256, 64)
        .unwrap();
    assert_ne!(first_id, second_id);

    let fresh = codec.create(&payload("alice", "admin"), None, None).unwrap();
    assert_eq!(header_kid(&fresh), first_id);
    assert_eq!(codec.verify(&fresh).unwrap()["kid"], first_id.as_str());

    let standalone = TokenCodec::standalone(TokenConfig::new(first_secret)).unwrap();
    assert_eq!(standalone.verify(&fresh).unwrap()["sub"], "alice");

    // Once the first key leaves the store its tokens are refused under its own id
    manager.write().unwrap().cleanup(0, false).unwrap();
    match codec.verify(&fresh) {
        Err(TokenError::Invalid(e)) => assert_eq!(e.kind(), InvalidKind::UnknownKey),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_rotation_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.json");
    let (manager, _) = bootstrap(&dir);

    let (_, second_id) = manager
        .write()
        .unwrap()
        .rotate(SigningAlgorithm::HS256, 64)
        .unwrap();

    let reopened = KeyManager::open(&path);
    let status = reopened.status();
    assert_eq!(status.active_key_id.as_deref(), Some(second_id.as_str()));
    assert_eq!(status.total_keys, 2);
    assert_eq!(status.inactive_keys, 1);
    assert_eq!(reopened.list_keys(false).len(), 1);

    let previous = reopened
        .list_keys(true)
        .into_iter()
        .find(|m| !m.is_active)
        .unwrap();
    assert_eq!(previous.rotation_count, 1);
}

#[test]
fn test_secret_outside_store_rejected() {
    let dir = TempDir::new().unwrap();
    let (manager, _) = bootstrap(&dir);

    // A valid secret that was never registered with the store
    let stranger = TokenConfig::new(keyward_keys::generate_secret(64).unwrap());
    let issuer = TokenCodec::standalone(stranger.clone()).unwrap();
    let verifier = TokenCodec::with_key_manager(stranger, manager).unwrap();

    let token = issuer.create(&payload("alice", "admin"), None, None).unwrap();
    assert!(issuer.verify(&token).is_ok());
    match verifier.verify(&token) {
        Err(TokenError::Invalid(e)) => assert_eq!(e.kind(), InvalidKind::UnknownKey),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_rotation_disabled_ignores_previous_secret() {
    let old = keyward_keys::generate_secret(64).unwrap();
    let old_codec = TokenCodec::standalone(TokenConfig::new(old.clone())).unwrap();
    let token = old_codec.create(&payload("alice", "admin"), None, None).unwrap();

    let config = TokenConfig::new(keyward_keys::generate_secret(64).unwrap())
        .with_previous_secret(old)
        .with_rotation(false);
    let codec = TokenCodec::standalone(config).unwrap();
    assert!(matches!(codec.verify(&token), Err(TokenError::Invalid(_))));
}

#[test]
fn test_verify_during_concurrent_rotation() {
    let dir = TempDir::new().unwrap();
    let (manager, secret) = bootstrap(&dir);
    let codec = Arc::new(
        TokenCodec::with_key_manager(TokenConfig::new(secret), manager.clone()).unwrap(),
    );
    let token = codec.create(&payload("alice", "admin"), None, None).unwrap();

    let verifiers: Vec<_> = (0..4)
        .map(|_| {
            let codec = Arc::clone(&codec);
            let token = token.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    assert!(codec.verify(&token).is_ok());
                }
            })
        })
        .collect();

    let rotator = thread::spawn(move || {
        for _ in 0..5 {
            manager
                .write()
                .unwrap()
                .rotate(SigningAlgorithm::HS256, 64)
                .unwrap();
        }
    });

    rotator.join().unwrap();
    for handle in verifiers {
        handle.join().unwrap();
    }
}
