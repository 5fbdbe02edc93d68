//! Token creation and multi-key verification
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::claims::{self, Claims, EXPIRES_AT, ISSUED_AT, KEY_ID, NOT_BEFORE, TOKEN_ID};
use crate::error::{InvalidKind, TokenError, TokenResult};
use crate::jwe::{self, ContentKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use keyward_config::{ConfigError, TokenConfig};
use keyward_keys::{derive_key_id, KeyId, KeyManager, SharedKeyManager, SigningAlgorithm};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLockReadGuard};
use tracing::{debug, info, warn};

/// Tokens issued longer ago than this are flagged in strict mode
const OLD_TOKEN_AGE_SECS: i64 = 24 * 60 * 60;

/// Key id reported for the RSA verification key
const RSA_KEY_ID: &str = "rsa-key";

/// Access token plus the metadata a client needs to use it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Signing key id, for symmetric algorithms
    pub key_id: Option<KeyId>,
    pub algorithm: SigningAlgorithm,
    pub jwe_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationStatus {
    pub rotation_enabled: bool,
    pub current_key_id: KeyId,
    pub previous_key_id: Option<KeyId>,
    pub grace_period_hours: u64,
    pub algorithm: SigningAlgorithm,
    pub jwe_enabled: bool,
}

/// One key a signature may be checked against
struct VerifyKey {
    key_id: KeyId,
    key: DecodingKey,
    /// Rotated-out key kept for the grace period
    previous: bool,
}

enum PemKind {
    Private,
    Public,
}

/// Read a PEM file and check it carries the expected key marker
fn load_pem(path: &Path, kind: PemKind) -> TokenResult<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        TokenError::KeyFormat(format!("Failed to load key from {}: {}", path.display(), e))
    })?;

    let (marker, label) = match kind {
        PemKind::Private => ("PRIVATE KEY", "private"),
        PemKind::Public => ("PUBLIC KEY", "public"),
    };
    if !content.contains(marker) {
        return Err(TokenError::KeyFormat(format!(
            "Invalid {} key format in {}",
            label,
            path.display()
        )));
    }
    Ok(content)
}

fn jwt_algorithm(algorithm: SigningAlgorithm) -> Algorithm {
    match algorithm {
        SigningAlgorithm::HS256 => Algorithm::HS256,
        SigningAlgorithm::RS256 => Algorithm::RS256,
    }
}

/// 128-bit random nonce, URL-safe encoded
fn new_token_id() -> String {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);
    URL_SAFE_NO_PAD.encode(nonce)
}

fn classify(kind: &ErrorKind) -> InvalidKind {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => InvalidKind::Signature,
        ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject => InvalidKind::Claims,
        _ => InvalidKind::Format,
    }
}

/// Issues and verifies bearer tokens.
///
/// Configuration and key material are fixed at construction. When a
/// [`SharedKeyManager`] is attached, its store decides which symmetric keys
/// are still trusted: keys missing from the store are never used for
/// verification. `verify` only takes a read lock and is safe to call from
/// many threads at once.
pub struct TokenCodec {
    config: TokenConfig,
    keys: Option<SharedKeyManager>,
    signing_key: EncodingKey,
    verify_keys: Vec<VerifyKey>,
    validation: Validation,
    content_key: ContentKey,
    previous_content_key: Option<ContentKey>,
}

impl TokenCodec {
    /// Build a codec, loading RSA key files for RS256.
    pub fn new(config: TokenConfig, keys: Option<SharedKeyManager>) -> TokenResult<Self> {
        config.validate()?;

        let (signing_key, verify_keys) = match config.algorithm {
            SigningAlgorithm::HS256 => {
                let mut verify_keys = vec![VerifyKey {
                    key_id: config.secret_id(),
                    key: DecodingKey::from_secret(config.secret.as_bytes()),
                    previous: false,
                }];
                if let Some(previous) = config.rotation_secret() {
                    verify_keys.push(VerifyKey {
                        key_id: derive_key_id(previous),
                        key: DecodingKey::from_secret(previous.as_bytes()),
                        previous: true,
                    });
                }
                (
                    EncodingKey::from_secret(config.secret.as_bytes()),
                    verify_keys,
                )
            }
            SigningAlgorithm::RS256 => {
                let private_path = config
                    .private_key_path
                    .as_deref()
                    .ok_or(ConfigError::MissingKeyPath("JWT_PRIVATE_KEY_PATH"))?;
                let public_path = config
                    .public_key_path
                    .as_deref()
                    .ok_or(ConfigError::MissingKeyPath("JWT_PUBLIC_KEY_PATH"))?;

                let private_pem = load_pem(private_path, PemKind::Private)?;
                let signing_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| TokenError::KeyFormat(format!("{}: {}", private_path.display(), e)))?;

                let public_pem = load_pem(public_path, PemKind::Public)?;
                let public_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| TokenError::KeyFormat(format!("{}: {}", public_path.display(), e)))?;

                (
                    signing_key,
                    vec![VerifyKey {
                        key_id: RSA_KEY_ID.to_string(),
                        key: public_key,
                        previous: false,
                    }],
                )
            }
        };

        let mut validation = Validation::new(jwt_algorithm(config.algorithm));
        validation.leeway = config.max_clock_skew_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&[EXPIRES_AT]);

        for advisory in config.runtime_warnings() {
            warn!("{}", advisory);
        }

        info!(
            algorithm = %config.algorithm,
            jwe_enabled = config.jwe_enabled,
            rotation_enabled = config.rotation_enabled,
            verify_keys = verify_keys.len(),
            key_store = keys.is_some(),
            "Token codec initialized"
        );

        Ok(Self {
            content_key: ContentKey::from_secret(&config.secret),
            previous_content_key: config.rotation_secret().map(ContentKey::from_secret),
            config,
            keys,
            signing_key,
            verify_keys,
            validation,
        })
    }

    /// Codec that trusts only the configured secrets
    pub fn standalone(config: TokenConfig) -> TokenResult<Self> {
        Self::new(config, None)
    }

    /// Codec whose symmetric keys are checked against the key store
    pub fn with_key_manager(config: TokenConfig, keys: SharedKeyManager) -> TokenResult<Self> {
        Self::new(config, Some(keys))
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn key_manager(&self) -> Option<&SharedKeyManager> {
        self.keys.as_ref()
    }

    fn read_keys(&self) -> Option<RwLockReadGuard<'_, KeyManager>> {
        self.keys
            .as_ref()
            .map(|keys| keys.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn default_ttl(&self) -> Duration {
        Duration::try_minutes(self.config.ttl_minutes as i64).unwrap_or(Duration::MAX)
    }

    /// Key id written into new symmetric tokens: always the id of the configured secret
    fn signing_key_id(&self) -> KeyId {
        let key_id = self.config.secret_id();
        if let Some(keys) = self.read_keys() {
            match keys.active_key_id() {
                Some(active) if active != key_id => warn!(
                    configured = %key_id,
                    active = %active,
                    "Configured signing secret is not the store's active key"
                ),
                _ => {}
            }
        }
        key_id
    }

    /// Create a signed (and, if enabled, encrypted) token.
    ///
    /// `payload` must carry non-empty `sub` and `role` strings. `iat`, `nbf`,
    /// `exp` and `jti` are added; `ttl` defaults to the configured lifetime.
    /// For HS256 the `kid` is `key_id` when given, otherwise the id of the
    /// secret the token is signed with.
    pub fn create(
        &self,
        payload: &Claims,
        ttl: Option<Duration>,
        key_id: Option<&str>,
    ) -> TokenResult<String> {
        claims::check_identity(payload).map_err(TokenError::InvalidPayload)?;

        let now = Utc::now().timestamp();
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());

        let mut token_claims = Claims::new();
        token_claims.insert(ISSUED_AT.to_string(), Value::from(now));
        token_claims.insert(NOT_BEFORE.to_string(), Value::from(now));
        token_claims.insert(EXPIRES_AT.to_string(), Value::from(now.saturating_add(ttl.num_seconds())));
        token_claims.insert(TOKEN_ID.to_string(), Value::from(new_token_id()));
        for (name, value) in payload {
            token_claims.insert(name.clone(), value.clone());
        }

        let mut header = Header::new(jwt_algorithm(self.config.algorithm));
        if self.config.algorithm.is_symmetric() {
            let kid = key_id
                .map(str::to_string)
                .unwrap_or_else(|| self.signing_key_id());
            token_claims.insert(KEY_ID.to_string(), Value::from(kid.clone()));
            header.kid = Some(kid);
        }

        let token = encode(&header, &token_claims, &self.signing_key).map_err(|e| {
            warn!(error = %e, "Failed to create JWT token");
            TokenError::Signing(e.to_string())
        })?;

        if !self.config.jwe_enabled {
            return Ok(token);
        }

        jwe::encrypt(&token, &self.content_key).map_err(|e| {
            warn!(error = %e, "Failed to encrypt token");
            TokenError::Encryption(e.to_string())
        })
    }

    /// Create a token and report how it was issued
    pub fn issue(&self, payload: &Claims, ttl: Option<Duration>) -> TokenResult<IssuedToken> {
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        let access_token = self.create(payload, Some(ttl), None)?;

        Ok(IssuedToken {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: ttl.num_seconds(),
            key_id: self
                .config
                .algorithm
                .is_symmetric()
                .then(|| self.signing_key_id()),
            algorithm: self.config.algorithm,
            jwe_enabled: self.config.jwe_enabled,
        })
    }

    pub fn rotation_status(&self) -> RotationStatus {
        RotationStatus {
            rotation_enabled: self.config.rotation_enabled,
            current_key_id: self.config.secret_id(),
            previous_key_id: self.config.previous_secret_id(),
            grace_period_hours: self.config.grace_period_hours,
            algorithm: self.config.algorithm,
            jwe_enabled: self.config.jwe_enabled,
        }
    }

    /// Decrypt the JWE envelope, falling back to the previous key during rotation
    fn open_envelope(&self, token: &str) -> TokenResult<String> {
        let current_err = match jwe::decrypt(token, &self.content_key) {
            Ok(compact) => return Ok(compact),
            Err(e) => e,
        };

        let Some(previous) = &self.previous_content_key else {
            warn!(error = %current_err, "JWE decryption failed");
            return Err(TokenError::invalid(InvalidKind::Decryption));
        };

        match jwe::decrypt(token, previous) {
            Ok(compact) => {
                info!("Token decrypted with previous key during rotation");
                Ok(compact)
            }
            Err(previous_err) => {
                warn!(
                    current = %current_err,
                    previous = %previous_err,
                    "JWE decryption failed with both keys"
                );
                Err(TokenError::invalid(InvalidKind::Decryption))
            }
        }
    }

    /// Verify a token and return its claims.
    ///
    /// Candidate keys are tried in order (current, then previous while
    /// rotating) and the first that validates wins. An exceeded `exp` yields
    /// [`TokenError::Expired`]; every other failure is reported as
    /// [`TokenError::Invalid`] with the details only in the logs.
    pub fn verify(&self, token: &str) -> TokenResult<Claims> {
        let token = token.trim();
        if token.is_empty() {
            debug!("Rejected empty token");
            return Err(TokenError::invalid(InvalidKind::Empty));
        }

        let compact = if self.config.jwe_enabled {
            self.open_envelope(token)?
        } else {
            token.to_string()
        };

        let header = decode_header(&compact).map_err(|e| {
            warn!(error = %e, "Token verification failed: malformed token");
            TokenError::invalid(InvalidKind::Format)
        })?;

        let store = self.read_keys();
        let symmetric = self.config.algorithm.is_symmetric();

        if symmetric {
            if let (Some(keys), Some(kid)) = (store.as_deref(), header.kid.as_deref()) {
                if !keys.contains_key(kid) {
                    warn!(kid = %kid, "Token signed with a key that is not in the key store");
                    return Err(TokenError::invalid(InvalidKind::UnknownKey));
                }
            }
        }

        let mut failures: Vec<String> = Vec::new();
        let mut failure_kind: Option<InvalidKind> = None;
        let mut expired = false;
        let mut verified = None;

        for candidate in &self.verify_keys {
            if symmetric {
                if let Some(keys) = store.as_deref() {
                    if !keys.contains_key(&candidate.key_id) {
                        failures.push(format!("key {}: not in key store", candidate.key_id));
                        continue;
                    }
                }
            }

            match decode::<Claims>(&compact, &candidate.key, &self.validation) {
                Ok(data) => {
                    verified = Some((data.claims, candidate));
                    break;
                }
                Err(e) => {
                    if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                        expired = true;
                    }
                    failure_kind.get_or_insert(classify(e.kind()));
                    failures.push(format!("key {}: {}", candidate.key_id, e));
                }
            }
        }

        let Some((token_claims, key)) = verified else {
            if expired {
                warn!("Token verification failed: token expired");
                return Err(TokenError::Expired);
            }
            warn!(
                failures = %failures.join("; "),
                "Token verification failed with all keys"
            );
            return Err(TokenError::invalid(
                failure_kind.unwrap_or(InvalidKind::UnknownKey),
            ));
        };

        let now = Utc::now().timestamp();
        self.check_issued_at(&token_claims, now)?;
        claims::check_verified(&token_claims).map_err(|reason| {
            warn!(reason = %reason, "Token verification failed: invalid claims");
            TokenError::invalid(InvalidKind::Claims)
        })?;

        if key.previous {
            debug!(key_id = %key.key_id, "Token verified with previous key");
        }
        if self.config.strict_mode {
            self.audit(&token_claims, key, store.as_deref(), now);
        }

        Ok(token_claims)
    }

    /// `iat`, when present, must be numeric and not ahead of the clock beyond the leeway
    fn check_issued_at(&self, token_claims: &Claims, now: i64) -> TokenResult<()> {
        let Some(value) = token_claims.get(ISSUED_AT) else {
            return Ok(());
        };
        let leeway = self.config.max_clock_skew_seconds as i64;
        match claims::seconds(value) {
            Some(iat) if iat <= now.saturating_add(leeway) => Ok(()),
            Some(iat) => {
                warn!(iat, now, "Token verification failed: issued in the future");
                Err(TokenError::invalid(InvalidKind::Claims))
            }
            None => {
                warn!("Token verification failed: non-numeric iat");
                Err(TokenError::invalid(InvalidKind::Claims))
            }
        }
    }

    /// Strict-mode telemetry; never rejects a token
    fn audit(&self, token_claims: &Claims, key: &VerifyKey, store: Option<&KeyManager>, now: i64) {
        if let Some(iat) = claims::timestamp(token_claims, ISSUED_AT) {
            let age = now.saturating_sub(iat);
            if age > OLD_TOKEN_AGE_SECS {
                warn!(age_secs = age, "Old token detected");
            }
        }

        if !key.previous {
            return;
        }

        let kid = claims::non_empty_str(token_claims, KEY_ID).unwrap_or("unknown");
        info!(kid = %kid, "Token using previous key within rotation grace period");

        let activated = store.and_then(|keys| {
            keys.active_key_id()
                .and_then(|id| keys.key_metadata(id))
                .and_then(|metadata| metadata.last_used)
        });
        let grace_end = activated
            .zip(Duration::try_hours(self.config.grace_period_hours as i64))
            .and_then(|(at, grace)| at.checked_add_signed(grace));
        if let Some(grace_end) = grace_end {
            if Utc::now() > grace_end {
                warn!(
                    kid = %kid,
                    grace_period_hours = self.config.grace_period_hours,
                    "Previous key still in use after the rotation grace period"
                );
            }
        }
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("config", &self.config)
            .field("verify_keys", &self.verify_keys.len())
            .field("key_store", &self.keys.is_some())
            .finish()
    }
}
