//! Framework-free authentication boundary
//!
//! [`Authenticator`] turns a bearer token into a typed [`Principal`] that
//! request handlers receive explicitly. HTTP adapters map [`AuthFailure`]
//! onto responses through [`AuthFailure::status_code`].
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


use crate::claims::{self, Claims, ROLE, SUBJECT};
use crate::codec::TokenCodec;
use crate::error::TokenError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const BEARER_PREFIX: &str = "Bearer ";

/// Authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub subject: String,
    pub role: String,
    /// Full verified claim set
    pub claims: Claims,
}

impl Principal {
    fn from_claims(claims: Claims) -> Option<Self> {
        let subject = claims::non_empty_str(&claims, SUBJECT)?.to_string();
        let role = claims::non_empty_str(&claims, ROLE)?.to_string();
        Some(Self {
            subject,
            role,
            claims,
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Missing, expired or invalid credentials
    #[error("{reason}")]
    Unauthenticated { reason: String },

    #[error("Role '{required_role}' required")]
    Forbidden { required_role: String },
}

impl AuthFailure {
    fn unauthenticated(reason: impl Into<String>) -> Self {
        AuthFailure::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AuthFailure::Unauthenticated { .. } => 401,
            AuthFailure::Forbidden { .. } => 403,
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .trim()
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Verifies bearer tokens on behalf of request handlers
#[derive(Debug, Clone)]
pub struct Authenticator {
    codec: Arc<TokenCodec>,
}

impl Authenticator {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn authenticate(&self, bearer: Option<&str>) -> Result<Principal, AuthFailure> {
        let Some(token) = bearer else {
            debug!("Request carried no bearer token");
            return Err(AuthFailure::unauthenticated("Not authenticated"));
        };

        let claims = self.codec.verify(token).map_err(|e| match e {
            TokenError::Expired | TokenError::Invalid(_) => AuthFailure::unauthenticated(e.to_string()),
            other => {
                warn!(error = %other, "Unexpected error while verifying token");
                AuthFailure::unauthenticated("Could not validate credentials")
            }
        })?;

        Principal::from_claims(claims)
            .ok_or_else(|| AuthFailure::unauthenticated("Could not validate credentials"))
    }

    /// Authenticate and require an exact role match
    pub fn require_role(&self, bearer: Option<&str>, role: &str) -> Result<Principal, AuthFailure> {
        let principal = self.authenticate(bearer)?;
        if !principal.has_role(role) {
            warn!(
                subject = %principal.subject,
                role = %principal.role,
                required_role = %role,
                "Access denied"
            );
            return Err(AuthFailure::Forbidden {
                required_role: role.to_string(),
            });
        }
        Ok(principal)
    }
}
