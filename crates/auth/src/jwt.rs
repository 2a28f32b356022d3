//! Unverified inspection of access-token claims
//!
//! The client never holds the signing secret; it only reads `exp` to decide
//! whether a token handed to it (e.g. from a recovery link) needs refreshing.
//! The provider remains the authority on validity.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AuthError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Decodes the claims of a JWT without checking its signature or expiry.
pub fn decode_unverified(token: &str) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}
