use crate::config::jwt::JwtConfig;
use anyhow::Result;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

/// Clients react differently: an expired token prompts a silent refresh, an
/// invalid one forces a new login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,
    #[error("Token expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub token_type: String,
}

fn sign(config: &JwtConfig, user_id: Uuid, token_type: &str) -> Result<String> {
    let (secret, ttl) = match token_type {
        REFRESH => (&config.refresh_secret, config.refresh_token_expiry),
        _ => (&config.access_secret, config.access_token_expiry),
    };
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + ttl as usize,
        iat: now,
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
        token_type: token_type.to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to encode {} token: {}", token_type, e))
}

fn verify(config: &JwtConfig, token: &str, token_type: &str) -> Result<Uuid, TokenError> {
    let secret = match token_type {
        REFRESH => &config.refresh_secret,
        _ => &config.access_secret,
    };
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_audience(&[&config.audience]);

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })?;

    // An access token is never accepted where a refresh token is expected.
    if claims.token_type != token_type {
        return Err(TokenError::Invalid);
    }
    claims.sub.parse().map_err(|_| TokenError::Invalid)
}

pub fn sign_access_token(config: &JwtConfig, user_id: Uuid) -> Result<String> {
    sign(config, user_id, ACCESS)
}

pub fn sign_refresh_token(config: &JwtConfig, user_id: Uuid) -> Result<String> {
    sign(config, user_id, REFRESH)
}

pub fn verify_access_token(config: &JwtConfig, token: &str) -> Result<Uuid, TokenError> {
    verify(config, token, ACCESS)
}

pub fn verify_refresh_token(config: &JwtConfig, token: &str) -> Result<Uuid, TokenError> {
    verify(config, token, REFRESH)
}
