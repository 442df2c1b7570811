//! Dashboard authentication: password login minting a signed, time-bounded
//! session credential, and stateless verification of that credential on
//! every dashboard request.
//!
//! No cache sits in front of this path. Dashboard traffic is low-volume and
//! correctness matters more: `authenticate` always re-fetches the tenant so
//! a deactivated account is locked out immediately, even while its
//! credential signature is still valid.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::store::{Tenant, TenantDirectory};

pub const SESSION_TTL: Duration = Duration::from_secs(24 * 3600);

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Tenant id.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

pub struct SessionAuthenticator {
    directory: Arc<dyn TenantDirectory>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionAuthenticator {
    pub fn new(directory: Arc<dyn TenantDirectory>, secret: &str) -> Self {
        Self {
            directory,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: SESSION_TTL,
        }
    }

    fn invalid_credentials() -> AppError {
        // Identical error for unknown email and bad password, so the login
        // form does not leak which one failed.
        AppError::unauthenticated("invalid_credentials", "invalid email or password")
    }

    /// Verify the password and mint a signed session credential.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, Tenant)> {
        let tenant = self
            .directory
            .find_active_by_email(email)
            .await
            .map_err(|e| AppError::upstream("store_unavailable", e.to_string()))?
            .ok_or_else(Self::invalid_credentials)?;

        if !verify_password(&tenant.password_hash, password) {
            return Err(Self::invalid_credentials());
        }

        let claims = Claims {
            sub: tenant.id.clone(),
            exp: (chrono::Utc::now() + chrono::Duration::seconds(self.ttl.as_secs() as i64))
                .timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal("token_mint_failed", e.to_string()))?;
        Ok((token, tenant))
    }

    /// Verify signature and expiry, then re-fetch the tenant from the
    /// durable store so `is_active` is always current.
    pub async fn authenticate(&self, credential: &str) -> AppResult<Tenant> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(credential, &self.decoding, &validation)
            .map_err(|_| AppError::unauthenticated("invalid_session", "invalid or expired token"))?;

        let tenant = self
            .directory
            .find_active_by_id(&data.claims.sub)
            .await
            .map_err(|e| AppError::upstream("store_unavailable", e.to_string()))?;
        tenant.ok_or_else(|| {
            AppError::unauthenticated("invalid_session", "invalid or expired token")
        })
    }
}
