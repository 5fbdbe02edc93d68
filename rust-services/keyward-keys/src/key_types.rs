//! Key type definitions
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a key: the first 16 hex characters of SHA-256(secret)
pub type KeyId = String;

/// Number of hex characters kept from the secret digest
const KEY_ID_HEX_LEN: usize = 16;

/// Derive the key id for a secret.
///
/// Deterministic and not reversible; the same secret always maps to the same id.
pub fn derive_key_id(secret: &str) -> KeyId {
    let digest = Sha256::digest(secret.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(KEY_ID_HEX_LEN);
    id
}

/// Token signing algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 over a shared secret
    #[default]
    HS256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
}

impl SigningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::RS256 => "RS256",
        }
    }

    /// Whether tokens signed with this algorithm use the shared secret
    pub fn is_symmetric(&self) -> bool {
        matches!(self, SigningAlgorithm::HS256)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::HS256),
            "RS256" => Ok(SigningAlgorithm::RS256),
            other => Err(format!("Only HS256 and RS256 are supported, got {}", other)),
        }
    }
}

/// Key metadata
///
/// Only metadata is tracked; raw secret material never enters the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Key identifier
    pub key_id: KeyId,
    /// When the key was created
    pub created_at: DateTime<Utc>,
    /// Algorithm the key is intended for
    pub algorithm: SigningAlgorithm,
    /// Secret length in characters
    pub key_length: usize,
    /// Whether this is the active signing key
    pub is_active: bool,
    /// How many times this key has been rotated out
    #[serde(default)]
    pub rotation_count: u32,
    /// Last activation time
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl KeyMetadata {
    pub fn new(key_id: KeyId, algorithm: SigningAlgorithm, key_length: usize) -> Self {
        Self {
            key_id,
            created_at: Utc::now(),
            algorithm,
            key_length,
            is_active: false,
            rotation_count: 0,
            last_used: None,
        }
    }

    /// Age of the key relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}
