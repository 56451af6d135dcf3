use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a token is good for. `Access` is a full session; `TwoFactor` is the
/// short-lived pending state between a correct password and a correct second
/// factor, and grants nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Access,
    TwoFactor,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub scope: TokenScope,
    pub exp: i64,
}

impl Claims {
    pub fn access(user_id: Uuid) -> Self {
        Self {
            sub: user_id,
            scope: TokenScope::Access,
            exp: (Utc::now() + Duration::minutes(15)).timestamp(),
        }
    }

    pub fn two_factor(user_id: Uuid) -> Self {
        Self {
            sub: user_id,
            scope: TokenScope::TwoFactor,
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        }
    }
}

pub fn encode_token(claims: &Claims, secret: &str) -> Result<String, String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("JWT encode failed: {e}"))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("JWT decode failed: {e}"))
}

/// Decode and require a specific scope; a 2FA-pending token can never pass
/// as a session token or vice versa.
pub fn decode_scoped(token: &str, secret: &str, scope: TokenScope) -> Result<Claims, String> {
    let claims = decode_token(token, secret)?;
    if claims.scope != scope {
        return Err("JWT scope mismatch".to_string());
    }
    Ok(claims)
}
