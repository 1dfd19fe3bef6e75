//! Access and refresh tokens
//!
//! A token is `base64url(claims).base64url(hmac_sha256(claims))`, signed
//! with `token_secret` for access tokens and `refresh_token_secret` for
//! refresh tokens. The signature only proves the token was issued here;
//! validity is decided by the stored record and its expiry.

use crate::config::AuthConfig;
use crate::db::repositories::TokenRepository;
use crate::models::{AccessToken, RefreshToken, TokenPair, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Signed payload of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id
    pub sub: String,
    /// Issued at, seconds since epoch
    pub iat: i64,
    /// Unique token id
    pub jti: String,
}

/// Sign `claims` with `secret`
pub fn sign_token(claims: &TokenClaims, secret: &str) -> Result<String> {
    let payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(claims)?);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid token secret: {}", e))?;
    mac.update(payload.as_bytes());
    let signature = BASE64URL_NOPAD.encode(&mac.finalize().into_bytes());
    Ok(format!("{}.{}", payload, signature))
}

/// Decode the claims of a token signed with `secret`; `None` when the token
/// is malformed or the signature does not match
pub fn verify_token(token: &str, secret: &str) -> Option<TokenClaims> {
    let (payload, signature) = token.split_once('.')?;
    let signature = BASE64URL_NOPAD.decode(signature.as_bytes()).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let json = BASE64URL_NOPAD.decode(payload.as_bytes()).ok()?;
    serde_json::from_slice(&json).ok()
}

/// A stored access token together with its refresh token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access: AccessToken,
    pub refresh: Option<RefreshToken>,
}

pub struct TokenService {
    repo: Arc<dyn TokenRepository>,
    config: AuthConfig,
}

impl TokenService {
    pub fn new(repo: Arc<dyn TokenRepository>, config: AuthConfig) -> Self {
        Self { repo, config }
    }

    /// Issue an access token and its refresh token for `user`
    pub async fn generate_access_token(&self, user: &User) -> Result<TokenPair> {
        let now = Utc::now();
        let access_claims = new_claims(&user.id, now);
        let access = AccessToken {
            id: access_claims.jti.clone(),
            value: sign_token(&access_claims, &self.config.token_secret)?,
            user_id: user.id.clone(),
            expired_at: now + Duration::seconds(self.config.token_expired),
            created_at: now,
        };

        let refresh_claims = new_claims(&user.id, now);
        let refresh = RefreshToken {
            id: refresh_claims.jti.clone(),
            value: sign_token(&refresh_claims, &self.config.refresh_token_secret)?,
            access_token_id: access.id.clone(),
            expired_at: now + Duration::seconds(self.config.refresh_token_expired),
            created_at: now,
        };

        self.repo.create_pair(&access, &refresh).await?;
        tracing::debug!("Issued token {} for user {}", access.id, user.id);

        Ok(TokenPair {
            token: access.value,
            refresh_token: refresh.value,
            expired_at: access.expired_at,
        })
    }

    /// Signature check with the access token secret
    pub fn verify_access_token(&self, value: &str) -> Option<TokenClaims> {
        verify_token(value, &self.config.token_secret)
    }

    /// Look up a signed, stored access token. Expiry is not checked here.
    pub async fn check_access_token(&self, value: &str) -> Result<Option<IssuedToken>> {
        if self.verify_access_token(value).is_none() {
            return Ok(None);
        }
        let Some(access) = self.repo.find_access(value).await? else {
            return Ok(None);
        };
        let refresh = self.repo.find_refresh_for_access(&access.id).await?;
        Ok(Some(IssuedToken { access, refresh }))
    }

    /// Look up a signed, stored refresh token and its access token
    pub async fn check_refresh_token(&self, value: &str) -> Result<Option<IssuedToken>> {
        if verify_token(value, &self.config.refresh_token_secret).is_none() {
            return Ok(None);
        }
        let Some(refresh) = self.repo.find_refresh(value).await? else {
            return Ok(None);
        };
        let access = self
            .repo
            .find_access_by_id(&refresh.access_token_id)
            .await?
            .context("Refresh token without access token")?;
        Ok(Some(IssuedToken {
            access,
            refresh: Some(refresh),
        }))
    }

    /// Swap a token for a new pair while its refresh token is live.
    ///
    /// The old access token (and with it the old refresh token) is removed.
    /// Returns `None` when the refresh token is missing or expired.
    pub async fn refresh_token(&self, issued: &IssuedToken, user: &User) -> Result<Option<TokenPair>> {
        let Some(refresh) = &issued.refresh else {
            return Ok(None);
        };
        if refresh.is_expired(Utc::now()) {
            return Ok(None);
        }

        let pair = self.generate_access_token(user).await?;
        self.repo.delete_access(&issued.access.id).await?;
        Ok(Some(pair))
    }

    pub async fn remove_access_token(&self, id: &str) -> Result<()> {
        self.repo.delete_access(id).await?;
        Ok(())
    }

    pub async fn remove_refresh_token(&self, id: &str) -> Result<()> {
        self.repo.delete_refresh(id).await?;
        Ok(())
    }

    /// Prune tokens that can no longer be used or refreshed
    pub async fn delete_expired(&self) -> Result<u64> {
        let removed = self.repo.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!("Pruned {} expired tokens", removed);
        }
        Ok(removed)
    }
}

fn new_claims(user_id: &str, now: DateTime<Utc>) -> TokenClaims {
    TokenClaims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxTokenRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use proptest::prelude::*;

    async fn setup_test_service(config: AuthConfig) -> (DynDatabasePool, TokenService, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("holder".to_string(), "hash".to_string()), &[], &[])
            .await
            .expect("Failed to create user");
        let service = TokenService::new(SqlxTokenRepository::boxed(pool.clone()), config);
        (pool, service, user)
    }

    #[test]
    fn test_sign_and_verify() {
        let claims = new_claims("u1", Utc::now());
        let token = sign_token(&claims, "secret").unwrap();

        assert_eq!(verify_token(&token, "secret"), Some(claims));
        assert_eq!(verify_token(&token, "other-secret"), None);
        assert_eq!(verify_token("no-dot", "secret"), None);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let token = sign_token(&new_claims("u1", Utc::now()), "secret").unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = new_claims("admin", Utc::now());
        let forged_payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&forged_claims).unwrap());

        let forged = format!("{}.{}", forged_payload, signature);
        assert_eq!(verify_token(&forged, "secret"), None);
    }

    proptest! {
        #[test]
        fn verify_never_panics_on_garbage(input in ".{0,80}") {
            let _ = verify_token(&input, "secret");
        }
    }

    #[tokio::test]
    async fn test_generate_and_check() {
        let (_pool, service, user) = setup_test_service(AuthConfig::default()).await;
        let pair = service.generate_access_token(&user).await.unwrap();

        let issued = service.check_access_token(&pair.token).await.unwrap().unwrap();
        assert_eq!(issued.access.user_id, user.id);
        assert_eq!(issued.refresh.unwrap().value, pair.refresh_token);

        // refresh tokens are signed with the other secret
        assert!(service.check_access_token(&pair.refresh_token).await.unwrap().is_none());
        assert!(service.check_refresh_token(&pair.refresh_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_replaces_pair() {
        let config = AuthConfig {
            token_expired: -10,
            ..AuthConfig::default()
        };
        let (_pool, service, user) = setup_test_service(config).await;
        let pair = service.generate_access_token(&user).await.unwrap();
        let issued = service.check_access_token(&pair.token).await.unwrap().unwrap();
        assert!(issued.access.is_expired(Utc::now()));

        let renewed = service.refresh_token(&issued, &user).await.unwrap().unwrap();
        assert_ne!(renewed.token, pair.token);
        assert!(service.check_access_token(&pair.token).await.unwrap().is_none());
        assert!(service.check_access_token(&renewed.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_not_renewed() {
        let config = AuthConfig {
            token_expired: -10,
            refresh_token_expired: -5,
            ..AuthConfig::default()
        };
        let (_pool, service, user) = setup_test_service(config).await;
        let pair = service.generate_access_token(&user).await.unwrap();
        let issued = service.check_access_token(&pair.token).await.unwrap().unwrap();

        assert!(service.refresh_token(&issued, &user).await.unwrap().is_none());
        assert_eq!(service.delete_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_access_token() {
        let (_pool, service, user) = setup_test_service(AuthConfig::default()).await;
        let pair = service.generate_access_token(&user).await.unwrap();
        let issued = service.check_access_token(&pair.token).await.unwrap().unwrap();

        service.remove_access_token(&issued.access.id).await.unwrap();
        assert!(service.check_refresh_token(&pair.refresh_token).await.unwrap().is_none());
    }
}
