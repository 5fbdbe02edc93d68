//! Compact JWE envelope using direct key agreement and AES-256-GCM
//!
//! Layout: `BASE64URL(header) . "" . BASE64URL(iv) . BASE64URL(ciphertext) . BASE64URL(tag)`
//! with the protected header `{"alg":"dir","enc":"A256GCM","cty":"JWT"}` as
//! additional authenticated data. The encrypted-key segment is empty because
//! the content key is used directly.
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


use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const ALG_DIR: &str = "dir";
const ENC_A256GCM: &str = "A256GCM";
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum JweError {
    #[error("malformed JWE: {0}")]
    Format(String),

    #[error("unsupported JWE header: {0}")]
    Header(String),

    #[error("AES-GCM operation failed")]
    Crypto,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cty: Option<String>,
}

/// 256-bit content encryption key derived from a shared secret
#[derive(Clone)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// SHA-256 of the secret
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self(key)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.0.into())
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

/// Encrypt a compact JWT into a five-segment JWE
pub fn encrypt(plaintext: &str, key: &ContentKey) -> Result<String, JweError> {
    let header = ProtectedHeader {
        alg: ALG_DIR.to_string(),
        enc: ENC_A256GCM.to_string(),
        cty: Some("JWT".to_string()),
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| JweError::Format(e.to_string()))?;
    let encoded_header = URL_SAFE_NO_PAD.encode(header_json);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = key
        .cipher()
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: encoded_header.as_bytes(),
            },
        )
        .map_err(|_| JweError::Crypto)?;

    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    Ok(format!(
        "{}..{}.{}.{}",
        encoded_header,
        URL_SAFE_NO_PAD.encode(nonce),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, JweError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JweError::Format(format!("{} segment: {}", name, e)))
}

/// Decrypt a five-segment JWE back to its plaintext
pub fn decrypt(token: &str, key: &ContentKey) -> Result<String, JweError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 5 {
        return Err(JweError::Format(format!(
            "expected 5 segments, got {}",
            parts.len()
        )));
    }

    let header: ProtectedHeader = serde_json::from_slice(&decode_segment(parts[0], "header")?)
        .map_err(|e| JweError::Format(format!("header: {}", e)))?;
    if header.alg != ALG_DIR || header.enc != ENC_A256GCM {
        return Err(JweError::Header(format!("alg={} enc={}", header.alg, header.enc)));
    }
    if !parts[1].is_empty() {
        return Err(JweError::Format(
            "encrypted key must be empty for direct encryption".to_string(),
        ));
    }

    let iv = decode_segment(parts[2], "iv")?;
    if iv.len() != IV_LEN {
        return Err(JweError::Format(format!("iv must be {} bytes", IV_LEN)));
    }
    let mut sealed = decode_segment(parts[3], "ciphertext")?;
    let tag = decode_segment(parts[4], "tag")?;
    if tag.len() != TAG_LEN {
        return Err(JweError::Format(format!("tag must be {} bytes", TAG_LEN)));
    }
    sealed.extend_from_slice(&tag);

    let plaintext = key
        .cipher()
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: parts[0].as_bytes(),
            },
        )
        .map_err(|_| JweError::Crypto)?;

    String::from_utf8(plaintext).map_err(|e| JweError::Format(format!("plaintext: {}", e)))
}
