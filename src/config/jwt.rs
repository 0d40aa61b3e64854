use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: u64,  // 15 minutes
    pub refresh_token_expiry: u64, // 7 days
    pub issuer: String,
    pub audience: String,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self> {
        let access_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable must be set"))?;
        let refresh_secret = env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| access_secret.clone());

        for (name, secret) in [("JWT_SECRET", &access_secret), ("JWT_REFRESH_SECRET", &refresh_secret)] {
            if secret.len() < 32 {
                return Err(anyhow::anyhow!("{} must be at least 32 characters", name));
            }
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_token_expiry: super::parse_env("JWT_ACCESS_EXPIRATION", 900),
            refresh_token_expiry: super::parse_env("JWT_REFRESH_EXPIRATION", 604800),
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "civic-reporter-api".to_string()),
            audience: env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "civic-reporter-client".to_string()),
        })
    }
}
