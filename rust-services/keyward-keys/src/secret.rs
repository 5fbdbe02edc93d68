//! Secret strength policy and secure secret generation
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


use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Minimum secret length in characters (256 bits)
pub const MIN_SECRET_LENGTH: usize = 32;

/// Minimum Shannon entropy in bits per character
pub const MIN_SECRET_ENTROPY: f64 = 3.5;

/// Default length for generated secrets
pub const DEFAULT_SECRET_LENGTH: usize = 64;

/// Longest secret the generator produces.
///
/// With a 64-symbol alphabet the distinct-character rule cannot be met
/// reliably by random draws much beyond this length.
pub const MAX_SECRET_LENGTH: usize = 96;

/// Minimum share of distinct characters in a secret
const MIN_UNIQUE_CHAR_RATIO: f64 = 0.5;

const WEAK_VALUES: [&str; 5] = ["test", "secret", "password", "key", "token"];

const URL_SAFE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

const MAX_GENERATION_ATTEMPTS: usize = 16;

/// A single way in which a secret fails the strength policy
#[derive(Debug, Clone, PartialEq)]
pub enum SecretViolation {
    Empty,
    TooShort { length: usize, min_length: usize },
    /// Requested generated length exceeds [`MAX_SECRET_LENGTH`]
    TooLong { length: usize, max_length: usize },
    InvalidCharacters,
    LowEntropy { entropy: f64 },
    CommonValue,
    RepeatedCharacters { unique: usize, length: usize },
}

impl fmt::Display for SecretViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretViolation::Empty => write!(f, "secret cannot be empty"),
            SecretViolation::TooShort { length, min_length } => write!(
                f,
                "secret must be at least {} characters long (got {})",
                min_length, length
            ),
            SecretViolation::TooLong { length, max_length } => write!(
                f,
                "generated secrets are limited to {} characters (requested {})",
                max_length, length
            ),
            SecretViolation::InvalidCharacters => write!(
                f,
                "secret contains invalid characters, use base64/URL-safe characters only"
            ),
            SecretViolation::LowEntropy { entropy } => write!(
                f,
                "secret has insufficient entropy ({:.2} < {})",
                entropy, MIN_SECRET_ENTROPY
            ),
            SecretViolation::CommonValue => write!(f, "secret cannot be a common weak value"),
            SecretViolation::RepeatedCharacters { unique, length } => write!(
                f,
                "secret has too many repeated characters ({} distinct of {})",
                unique, length
            ),
        }
    }
}

/// Strength-policy failure listing every violated rule
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Weak secret: {}", describe(.violations))]
pub struct WeakSecret {
    violations: Vec<SecretViolation>,
}

fn describe(violations: &[SecretViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl WeakSecret {
    pub fn violations(&self) -> &[SecretViolation] {
        &self.violations
    }

    pub fn has(&self, check: impl Fn(&SecretViolation) -> bool) -> bool {
        self.violations.iter().any(check)
    }
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_')
}

/// Shannon entropy of the character-frequency distribution, in bits per character
pub fn shannon_entropy(secret: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut length = 0usize;
    for c in secret.chars() {
        *counts.entry(c).or_insert(0) += 1;
        length += 1;
    }
    if length == 0 {
        return 0.0;
    }

    counts
        .values()
        .map(|&count| {
            let p = count as f64 / length as f64;
            -p * p.log2()
        })
        .sum()
}

/// Check a secret against the strength policy.
///
/// All violated rules are reported, not only the first one. An empty
/// secret reports only [`SecretViolation::Empty`].
pub fn validate_secret(secret: &str, min_length: usize) -> Result<(), WeakSecret> {
    if secret.is_empty() {
        return Err(WeakSecret {
            violations: vec![SecretViolation::Empty],
        });
    }

    let mut violations = Vec::new();
    let length = secret.chars().count();

    if length < min_length {
        violations.push(SecretViolation::TooShort { length, min_length });
    }

    if !secret.chars().all(is_allowed_char) {
        violations.push(SecretViolation::InvalidCharacters);
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_SECRET_ENTROPY {
        violations.push(SecretViolation::LowEntropy { entropy });
    }

    let lowered = secret.to_lowercase();
    if WEAK_VALUES.contains(&lowered.as_str()) {
        violations.push(SecretViolation::CommonValue);
    }

    let unique = secret.chars().collect::<HashSet<_>>().len();
    if (unique as f64) < length as f64 * MIN_UNIQUE_CHAR_RATIO {
        violations.push(SecretViolation::RepeatedCharacters { unique, length });
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(WeakSecret { violations })
    }
}

fn random_url_safe(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| URL_SAFE_ALPHABET[rng.gen_range(0..URL_SAFE_ALPHABET.len())] as char)
        .collect()
}

/// Generate a cryptographically secure, URL-safe secret of exactly `length` characters.
///
/// Every returned secret passes [`validate_secret`]. Draws that happen to
/// fail the policy are repeated; lengths above [`MAX_SECRET_LENGTH`] are
/// refused outright.
pub fn generate_secret(length: usize) -> Result<String, WeakSecret> {
    if length > MAX_SECRET_LENGTH {
        return Err(WeakSecret {
            violations: vec![SecretViolation::TooLong {
                length,
                max_length: MAX_SECRET_LENGTH,
            }],
        });
    }

    let min_length = length.min(MIN_SECRET_LENGTH);
    let mut attempt = 1;
    loop {
        let secret = random_url_safe(length);
        match validate_secret(&secret, min_length) {
            Ok(()) => return Ok(secret),
            Err(weak) if attempt >= MAX_GENERATION_ATTEMPTS => return Err(weak),
            Err(_) => attempt += 1,
        }
    }
}
