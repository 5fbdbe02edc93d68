//! Non-sensitive summaries of the active secret configuration

use crate::TokenConfig;
use keyward_keys::{shannon_entropy, KeyId, SigningAlgorithm};
use serde::Serialize;

/// What can be said about the configured secrets without exposing them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretInfo {
    pub primary_secret_id: KeyId,
    pub previous_secret_id: Option<KeyId>,
    pub key_rotation_enabled: bool,
    pub algorithm: SigningAlgorithm,
    pub jwe_enabled: bool,
    pub strict_mode: bool,
    pub secret_length: usize,
    pub entropy_estimate: f64,
}

/// Scored review of the secret configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityReport {
    pub valid: bool,
    /// 0..=100
    pub security_score: u32,
    pub recommendations: Vec<String>,
    pub secret_info: SecretInfo,
}

impl TokenConfig {
    pub fn secret_info(&self) -> SecretInfo {
        SecretInfo {
            primary_secret_id: self.secret_id(),
            previous_secret_id: self.previous_secret_id(),
            key_rotation_enabled: self.rotation_enabled,
            algorithm: self.algorithm,
            jwe_enabled: self.jwe_enabled,
            strict_mode: self.strict_mode,
            secret_length: self.secret.chars().count(),
            entropy_estimate: shannon_entropy(&self.secret),
        }
    }

    pub fn security_report(&self) -> SecurityReport {
        let info = self.secret_info();
        let mut recommendations = Vec::new();
        let mut penalty = 0u32;

        if info.secret_length < 32 {
            recommendations.push("Increase secret length to at least 32 characters".to_string());
            penalty += 30;
        } else if info.secret_length < 64 {
            recommendations.push(
                "Consider using a longer secret (64+ characters) for enhanced security".to_string(),
            );
            penalty += 10;
        }

        if info.entropy_estimate < 3.5 {
            recommendations
                .push("Secret has low entropy - consider using a more random secret".to_string());
            penalty += 25;
        } else if info.entropy_estimate < 4.0 {
            recommendations.push("Secret entropy could be improved".to_string());
            penalty += 10;
        }

        if !info.key_rotation_enabled {
            recommendations.push("Enable key rotation for improved security".to_string());
            penalty += 15;
        }

        if !info.jwe_enabled {
            recommendations.push("Consider enabling JWE encryption for sensitive data".to_string());
            penalty += 10;
        }

        SecurityReport {
            valid: recommendations.is_empty(),
            security_score: 100u32.saturating_sub(penalty),
            recommendations,
            secret_info: info,
        }
    }
}
