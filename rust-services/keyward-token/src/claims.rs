//! Token claims and the rules applied to them

use serde_json::{Map, Value};

/// String-keyed claims mapping carried by a token
pub type Claims = Map<String, Value>;

pub const SUBJECT: &str = "sub";
pub const ROLE: &str = "role";
pub const ISSUED_AT: &str = "iat";
pub const NOT_BEFORE: &str = "nbf";
pub const EXPIRES_AT: &str = "exp";
pub const TOKEN_ID: &str = "jti";
pub const KEY_ID: &str = "kid";

/// Value of `name` if it is a non-empty string
pub fn non_empty_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Unix seconds from a numeric claim; fractional values are truncated
pub fn timestamp(claims: &Claims, name: &str) -> Option<i64> {
    claims.get(name).and_then(seconds)
}

pub(crate) fn seconds(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f.trunc() as i64)
    })
}

/// Identity claims an issuer must supply
pub(crate) fn check_identity(claims: &Claims) -> Result<(), String> {
    for name in [SUBJECT, ROLE] {
        if non_empty_str(claims, name).is_none() {
            return Err(format!("payload must contain a non-empty '{}' claim", name));
        }
    }
    Ok(())
}

/// Mandatory claim rules for a token whose signature already checked out
pub(crate) fn check_verified(claims: &Claims) -> Result<(), String> {
    check_identity(claims)?;

    if let Some(jti) = claims.get(TOKEN_ID) {
        match jti.as_str() {
            Some(s) if !s.is_empty() => {}
            _ => return Err("'jti' claim must be non-empty if present".to_string()),
        }
    }
    Ok(())
}
