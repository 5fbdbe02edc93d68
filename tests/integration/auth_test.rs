//! Integration tests for the authentication boundary

use keyward_config::TokenConfig;
use keyward_keys::{generate_secret, KeyManagerCell, SigningAlgorithm};
use keyward_token::{bearer_token, AuthFailure, Authenticator, Claims, TokenCodec};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn payload(sub: &str, role: &str) -> Claims {
    json!({ "sub": sub, "role": role, "tenant": "acme" })
        .as_object()
        .cloned()
        .unwrap()
}

fn authenticator(config: TokenConfig) -> Authenticator {
    Authenticator::new(Arc::new(TokenCodec::standalone(config).unwrap()))
}

#[test]
fn test_header_to_principal() {
    let auth = authenticator(TokenConfig::new(generate_secret(64).unwrap()));
    let token = auth.codec().create(&payload("alice", "admin"), None, None).unwrap();
    let header = format!("Bearer {}", token);

    let principal = auth.require_role(bearer_token(&header), "admin").unwrap();
    assert_eq!(principal.subject, "alice");
    assert_eq!(principal.claims["tenant"], "acme");
}

#[test]
fn test_failures_map_to_status_codes() {
    let auth = authenticator(TokenConfig::new(generate_secret(64).unwrap()));
    let token = auth.codec().create(&payload("bob", "user"), None, None).unwrap();

    assert_eq!(auth.authenticate(bearer_token("Basic abc")).unwrap_err().status_code(), 401);
    assert_eq!(auth.authenticate(Some("x.y.z")).unwrap_err().status_code(), 401);
    assert_eq!(
        auth.require_role(Some(&token), "admin").unwrap_err(),
        AuthFailure::Forbidden {
            required_role: "admin".to_string()
        }
    );
}

#[test]
fn test_expired_token_reason() {
    let auth = authenticator(TokenConfig::new(generate_secret(64).unwrap()).with_max_clock_skew(0));
    let token = auth
        .codec()
        .create(&payload("alice", "admin"), Some(chrono::Duration::seconds(-10)), None)
        .unwrap();

    assert_eq!(
        auth.authenticate(Some(&token)).unwrap_err(),
        AuthFailure::Unauthenticated {
            reason: "Token expired".to_string()
        }
    );
}

#[test]
fn test_shared_manager_built_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.json");
    let cell = KeyManagerCell::new();

    let first = cell.get_or_init(path.to_str());
    let secret = {
        let mut keys = first.write().unwrap();
        let (secret, key_id) = keys.generate(SigningAlgorithm::HS256, 64).unwrap();
        keys.activate(&key_id).unwrap();
        secret
    };

    let second = cell.get_or_init(None);
    assert!(Arc::ptr_eq(&first, &second));

    let codec = TokenCodec::with_key_manager(TokenConfig::new(secret), second).unwrap();
    let auth = Authenticator::new(Arc::new(codec));
    let token = auth.codec().create(&payload("alice", "admin"), None, None).unwrap();
    assert!(auth.authenticate(Some(&token)).is_ok());
}
