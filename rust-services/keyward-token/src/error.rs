//! Error types for token operations
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


use keyward_config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Internal classification of a rejected token.
///
/// Only meant for logs; every kind surfaces to callers as the same
/// "Invalid token" message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKind {
    /// Empty or whitespace-only input
    Empty,
    /// Not a well-formed JWT/JWE
    Format,
    /// JWE envelope could not be decrypted with any key
    Decryption,
    /// No candidate key produced a valid signature
    Signature,
    /// The token names a key that is no longer in the store
    UnknownKey,
    /// Signature was valid but the claims were not
    Claims,
}

impl fmt::Display for InvalidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidKind::Empty => "empty",
            InvalidKind::Format => "format",
            InvalidKind::Decryption => "decryption",
            InvalidKind::Signature => "signature",
            InvalidKind::UnknownKey => "unknown_key",
            InvalidKind::Claims => "claims",
        };
        f.write_str(s)
    }
}

/// A token rejection whose cause is kept out of the display text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidToken {
    kind: InvalidKind,
}

impl InvalidToken {
    pub fn new(kind: InvalidKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> InvalidKind {
        self.kind
    }
}

impl fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid token")
    }
}

/// Token issuance and verification errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid key format: {0}")]
    KeyFormat(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Token encryption failed: {0}")]
    Encryption(String),

    #[error("Token expired")]
    Expired,

    #[error("{0}")]
    Invalid(InvalidToken),
}

impl TokenError {
    pub(crate) fn invalid(kind: InvalidKind) -> Self {
        TokenError::Invalid(InvalidToken::new(kind))
    }

    /// Whether this is a verification failure (expired or invalid)
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, TokenError::Expired | TokenError::Invalid(_))
    }
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;
