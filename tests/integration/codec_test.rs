//! Integration tests for token encodings: JWE envelopes and RS256 signing

use keyward_config::{ConfigError, TokenConfig};
use keyward_keys::{generate_secret, init_key_manager, SigningAlgorithm};
use keyward_token::{Claims, InvalidKind, TokenCodec, TokenError};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

fn payload(sub: &str, role: &str) -> Claims {
    json!({ "sub": sub, "role": role }).as_object().cloned().unwrap()
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

fn rsa_config() -> TokenConfig {
    TokenConfig::new(generate_secret(64).unwrap())
        .with_algorithm(SigningAlgorithm::RS256)
        .with_key_paths(fixture("rsa_private.pem"), fixture("rsa_public.pem"))
}

fn expect_invalid(result: Result<Claims, TokenError>, kind: InvalidKind) {
    match result {
        Err(TokenError::Invalid(e)) => assert_eq!(e.kind(), kind),
        other => panic!("expected invalid token ({}), got {:?}", kind, other),
    }
}

#[test]
fn test_jwe_round_trip() {
    let codec = TokenCodec::standalone(TokenConfig::new(generate_secret(64).unwrap()).with_jwe(true)).unwrap();
    let token = codec.create(&payload("alice", "admin"), None, None).unwrap();

    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 5);
    assert!(parts[1].is_empty());
    assert!(!token.contains("alice"));

    assert_eq!(codec.verify(&token).unwrap()["sub"], "alice");
}

#[test]
fn test_jwe_with_foreign_key_is_invalid() {
    let issuer = TokenCodec::standalone(TokenConfig::new(generate_secret(64).unwrap()).with_jwe(true)).unwrap();
    let verifier =
        TokenCodec::standalone(TokenConfig::new(generate_secret(64).unwrap()).with_jwe(true)).unwrap();

    let token = issuer.create(&payload("alice", "admin"), None, None).unwrap();
    expect_invalid(verifier.verify(&token), InvalidKind::Decryption);
}

#[test]
fn test_jwe_codec_rejects_plain_jwt() {
    let secret = generate_secret(64).unwrap();
    let plain = TokenCodec::standalone(TokenConfig::new(secret.clone())).unwrap();
    let encrypted = TokenCodec::standalone(TokenConfig::new(secret).with_jwe(true)).unwrap();

    let token = plain.create(&payload("alice", "admin"), None, None).unwrap();
    expect_invalid(encrypted.verify(&token), InvalidKind::Decryption);
}

#[test]
fn test_jwe_decrypts_with_previous_key_during_rotation() {
    let old = TokenConfig::new(generate_secret(64).unwrap()).with_jwe(true);
    let old_codec = TokenCodec::standalone(old.clone()).unwrap();
    let token = old_codec.create(&payload("alice", "admin"), None, None).unwrap();

    let rotated = TokenCodec::standalone(old.rotated(generate_secret(64).unwrap())).unwrap();
    assert_eq!(rotated.verify(&token).unwrap()["role"], "admin");

    let new_token = rotated.create(&payload("bob", "user"), None, None).unwrap();
    expect_invalid(old_codec.verify(&new_token), InvalidKind::Decryption);
}

#[test]
fn test_rs256_round_trip() {
    let codec = TokenCodec::standalone(rsa_config()).unwrap();
    let issued = codec.issue(&payload("alice", "admin"), None).unwrap();

    assert_eq!(issued.algorithm, SigningAlgorithm::RS256);
    assert!(issued.key_id.is_none());

    let claims = codec.verify(&issued.access_token).unwrap();
    assert_eq!(claims["sub"], "alice");
    assert!(!claims.contains_key("kid"));
}

#[test]
fn test_rs256_ignores_key_store() {
    let dir = TempDir::new().unwrap();
    let manager = init_key_manager(dir.path().join("keys.json").to_str());
    let codec = TokenCodec::with_key_manager(rsa_config(), manager).unwrap();

    let token = codec.create(&payload("alice", "admin"), None, None).unwrap();
    assert!(codec.verify(&token).is_ok());
}

#[test]
fn test_rs256_with_jwe() {
    let codec = TokenCodec::standalone(rsa_config().with_jwe(true)).unwrap();
    let token = codec.create(&payload("alice", "admin"), None, None).unwrap();
    assert_eq!(token.split('.').count(), 5);
    assert!(codec.verify(&token).is_ok());
}

#[test]
fn test_rs256_rejects_hs256_token() {
    let hs = TokenCodec::standalone(TokenConfig::new(generate_secret(64).unwrap())).unwrap();
    let rs = TokenCodec::standalone(rsa_config()).unwrap();

    let token = hs.create(&payload("alice", "admin"), None, None).unwrap();
    assert!(matches!(rs.verify(&token), Err(TokenError::Invalid(_))));
}

#[test]
fn test_rs256_key_marker_checked() {
    // Public key where the private key belongs
    let config = TokenConfig::new(generate_secret(64).unwrap())
        .with_algorithm(SigningAlgorithm::RS256)
        .with_key_paths(fixture("rsa_public.pem"), fixture("rsa_public.pem"));
    assert!(matches!(
        TokenCodec::standalone(config),
        Err(TokenError::KeyFormat(_))
    ));
}

#[test]
fn test_rs256_missing_key_file() {
    let config = TokenConfig::new(generate_secret(64).unwrap())
        .with_algorithm(SigningAlgorithm::RS256)
        .with_key_paths(fixture("missing.pem"), fixture("rsa_public.pem"));
    assert!(matches!(
        TokenCodec::standalone(config),
        Err(TokenError::KeyFormat(_))
    ));
}

#[test]
fn test_rs256_requires_key_paths() {
    let config = TokenConfig::new(generate_secret(64).unwrap()).with_algorithm(SigningAlgorithm::RS256);
    assert!(matches!(
        TokenCodec::standalone(config),
        Err(TokenError::Config(ConfigError::MissingKeyPath(_)))
    ));
}

#[test]
fn test_non_strict_mode_verifies_previous_key() {
    let old = TokenConfig::new(generate_secret(64).unwrap()).with_strict_mode(false);
    let token = TokenCodec::standalone(old.clone())
        .unwrap()
        .create(&payload("alice", "admin"), None, None)
        .unwrap();

    let rotated = TokenCodec::standalone(old.rotated(generate_secret(64).unwrap())).unwrap();
    assert!(rotated.verify(&token).is_ok());
}
