//! Configuration management for keyward token services

mod report;

pub use report::{SecretInfo, SecurityReport};

use keyward_keys::{
    derive_key_id, validate_secret, KeyId, SigningAlgorithm, WeakSecret, MIN_SECRET_LENGTH,
};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEFAULT_TTL_MINUTES: u64 = 30;
const DEFAULT_GRACE_PERIOD_HOURS: u64 = 24;
const DEFAULT_MAX_CLOCK_SKEW_SECONDS: u64 = 300;

/// Upper bounds for the numeric settings: one year of token lifetime,
/// one year of grace period, one day of clock skew
pub const MAX_TTL_MINUTES: u64 = 525_600;
pub const MAX_GRACE_PERIOD_HOURS: u64 = 8_760;
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 86_400;

fn check_bound(name: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::InvalidValue {
            name,
            value: format!("{} (maximum {})", value, max),
        });
    }
    Ok(())
}

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} validation failed: {source}")]
    WeakSecret {
        name: &'static str,
        #[source]
        source: WeakSecret,
    },

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} required for RS256")]
    MissingKeyPath(&'static str),

    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

/// Token service configuration.
///
/// Loaded once at process start and treated as immutable afterwards.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub previous_secret: Option<String>,
    pub algorithm: SigningAlgorithm,
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub jwe_enabled: bool,
    pub ttl_minutes: u64,
    pub rotation_enabled: bool,
    pub grace_period_hours: u64,
    pub strict_mode: bool,
    pub max_clock_skew_seconds: u64,
}

/// Raw `JWT_*` values as read from the environment
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    secret: Option<String>,
    secret_previous: Option<String>,
    algorithm: Option<String>,
    private_key_path: Option<String>,
    public_key_path: Option<String>,
    enable_jwe: Option<String>,
    expire_minutes: Option<String>,
    key_rotation_enabled: Option<String>,
    key_rotation_grace_hours: Option<String>,
    strict_mode: Option<String>,
    max_clock_skew: Option<String>,
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_number(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue { name, value: v }),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TokenConfig {
    /// Configuration with defaults around a single HS256 secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            previous_secret: None,
            algorithm: SigningAlgorithm::HS256,
            private_key_path: None,
            public_key_path: None,
            jwe_enabled: false,
            ttl_minutes: DEFAULT_TTL_MINUTES,
            rotation_enabled: false,
            grace_period_hours: DEFAULT_GRACE_PERIOD_HOURS,
            strict_mode: true,
            max_clock_skew_seconds: DEFAULT_MAX_CLOCK_SKEW_SECONDS,
        }
    }

    /// Load configuration from `JWT_*` environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("JWT"))
            .build()?;
        Self::from_settings(&settings)
    }

    /// Build and validate configuration from already assembled settings
    pub fn from_settings(settings: &config::Config) -> Result<Self, ConfigError> {
        let raw: RawSettings = settings.clone().try_deserialize()?;

        let secret = non_empty(raw.secret).ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let previous_secret = non_empty(raw.secret_previous);

        let algorithm = match raw.algorithm {
            Some(alg) => alg
                .parse::<SigningAlgorithm>()
                .map_err(|_| ConfigError::UnsupportedAlgorithm(alg))?,
            None => SigningAlgorithm::HS256,
        };

        let ttl_minutes = match raw.expire_minutes {
            Some(v) => v.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(
                    value = %v,
                    "Invalid JWT_EXPIRE_MINUTES, must be an integer. Using default {}",
                    DEFAULT_TTL_MINUTES
                );
                DEFAULT_TTL_MINUTES
            }),
            None => DEFAULT_TTL_MINUTES,
        };

        let rotation_enabled = raw
            .key_rotation_enabled
            .as_deref()
            .map(parse_flag)
            .unwrap_or(previous_secret.is_some());

        let config = Self {
            secret,
            previous_secret,
            algorithm,
            private_key_path: non_empty(raw.private_key_path).map(PathBuf::from),
            public_key_path: non_empty(raw.public_key_path).map(PathBuf::from),
            jwe_enabled: raw.enable_jwe.as_deref().map(parse_flag).unwrap_or(false),
            ttl_minutes,
            rotation_enabled,
            grace_period_hours: parse_number(
                "JWT_KEY_ROTATION_GRACE_HOURS",
                raw.key_rotation_grace_hours,
                DEFAULT_GRACE_PERIOD_HOURS,
            )?,
            strict_mode: raw.strict_mode.as_deref().map(parse_flag).unwrap_or(true),
            max_clock_skew_seconds: parse_number(
                "JWT_MAX_CLOCK_SKEW",
                raw.max_clock_skew,
                DEFAULT_MAX_CLOCK_SKEW_SECONDS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_previous_secret(mut self, previous: impl Into<String>) -> Self {
        self.previous_secret = Some(previous.into());
        self.rotation_enabled = true;
        self
    }

    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_key_paths(mut self, private_key: impl Into<PathBuf>, public_key: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(private_key.into());
        self.public_key_path = Some(public_key.into());
        self
    }

    pub fn with_jwe(mut self, enabled: bool) -> Self {
        self.jwe_enabled = enabled;
        self
    }

    pub fn with_ttl_minutes(mut self, minutes: u64) -> Self {
        self.ttl_minutes = minutes;
        self
    }

    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotation_enabled = enabled;
        self
    }

    pub fn with_grace_period_hours(mut self, hours: u64) -> Self {
        self.grace_period_hours = hours;
        self
    }

    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    pub fn with_max_clock_skew(mut self, seconds: u64) -> Self {
        self.max_clock_skew_seconds = seconds;
        self
    }

    /// Configuration after promoting `new_secret` to current.
    ///
    /// The current secret becomes the previous one and rotation is enabled,
    /// so tokens signed before the rotation keep verifying.
    pub fn rotated(self, new_secret: impl Into<String>) -> Self {
        let previous = self.secret.clone();
        Self {
            secret: new_secret.into(),
            ..self
        }
        .with_previous_secret(previous)
    }

    /// Check startup invariants: secrets present and strong, numeric settings
    /// in range, RS256 key files configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        validate_secret(&self.secret, MIN_SECRET_LENGTH).map_err(|source| {
            ConfigError::WeakSecret {
                name: "JWT_SECRET",
                source,
            }
        })?;

        if let Some(previous) = &self.previous_secret {
            validate_secret(previous, MIN_SECRET_LENGTH).map_err(|source| {
                ConfigError::WeakSecret {
                    name: "JWT_SECRET_PREVIOUS",
                    source,
                }
            })?;
        }

        check_bound("JWT_EXPIRE_MINUTES", self.ttl_minutes, MAX_TTL_MINUTES)?;
        check_bound(
            "JWT_KEY_ROTATION_GRACE_HOURS",
            self.grace_period_hours,
            MAX_GRACE_PERIOD_HOURS,
        )?;
        check_bound(
            "JWT_MAX_CLOCK_SKEW",
            self.max_clock_skew_seconds,
            MAX_CLOCK_SKEW_SECONDS,
        )?;

        if self.algorithm == SigningAlgorithm::RS256 {
            if self.private_key_path.is_none() {
                return Err(ConfigError::MissingKeyPath("JWT_PRIVATE_KEY_PATH"));
            }
            if self.public_key_path.is_none() {
                return Err(ConfigError::MissingKeyPath("JWT_PUBLIC_KEY_PATH"));
            }
        }

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    pub fn secret_id(&self) -> KeyId {
        derive_key_id(&self.secret)
    }

    pub fn previous_secret_id(&self) -> Option<KeyId> {
        self.previous_secret.as_deref().map(derive_key_id)
    }

    /// Previous secret, only while rotation is enabled
    pub fn rotation_secret(&self) -> Option<&str> {
        if self.rotation_enabled {
            self.previous_secret.as_deref()
        } else {
            None
        }
    }

    /// Strict-mode advisories about the configuration
    pub fn runtime_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.strict_mode {
            return warnings;
        }

        if self.algorithm == SigningAlgorithm::HS256 && self.secret.chars().count() < 64 {
            warnings.push(
                "For production use, consider using a longer JWT secret (64+ chars)".to_string(),
            );
        }
        if !self.jwe_enabled {
            warnings.push(
                "JWE encryption is disabled. Consider enabling for sensitive data".to_string(),
            );
        }
        if self.ttl_minutes > 60 {
            warnings.push(
                "Token expiration is longer than 1 hour. Consider shorter lifetimes".to_string(),
            );
        }
        warnings
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field(
                "previous_secret",
                &self.previous_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("algorithm", &self.algorithm)
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("jwe_enabled", &self.jwe_enabled)
            .field("ttl_minutes", &self.ttl_minutes)
            .field("rotation_enabled", &self.rotation_enabled)
            .field("grace_period_hours", &self.grace_period_hours)
            .field("strict_mode", &self.strict_mode)
            .field("max_clock_skew_seconds", &self.max_clock_skew_seconds)
            .finish()
    }
}
