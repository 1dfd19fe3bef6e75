//! Authentication service
//!
//! Login, registration and the account operations a signed-in user performs
//! on themselves. Request authentication also lives here: an expired access
//! token is swapped for a new pair while its refresh token is still live.

use crate::models::{CreateUserInput, TokenPair, UniqueField, User};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::TokenService;
use crate::services::user::{non_empty, validate_password, UserService, UserServiceError};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<UserServiceError> for AuthServiceError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound(msg) => AuthServiceError::NotFound(msg),
            UserServiceError::ValidationError(msg) => AuthServiceError::ValidationError(msg),
            UserServiceError::Conflict(msg) => AuthServiceError::Conflict(msg),
            UserServiceError::InternalError(e) => AuthServiceError::InternalError(e),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username, email or phone
    pub credential: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub username: String,
    pub nickname: Option<String>,
    pub password: String,
    /// Repeated password
    pub plain_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordInput {
    pub old_password: String,
    pub password: String,
    pub plain_password: String,
}

/// Profile fields a user may change on their own account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Result of authenticating a request
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    /// Id of the access token the request used
    pub token_id: String,
    /// Set when an expired token was refreshed on the way
    pub renewed: Option<TokenPair>,
}

pub struct AuthService {
    users: Arc<UserService>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(users: Arc<UserService>, tokens: Arc<TokenService>) -> Self {
        Self { users, tokens }
    }

    /// The live user matching `credential` and `password`, if any
    pub async fn validate_user(
        &self,
        credential: &str,
        password: &str,
    ) -> Result<Option<User>, AuthServiceError> {
        let Some(user) = self.users.find_by_credential(credential).await? else {
            return Ok(None);
        };
        if verify_password(password, &user.password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub async fn login(&self, input: LoginInput) -> Result<(User, TokenPair), AuthServiceError> {
        let user = self
            .validate_user(&input.credential, &input.password)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Failed login for {}", input.credential);
                AuthServiceError::Unauthorized("Invalid credential or password".to_string())
            })?;

        let pair = self.tokens.generate_access_token(&user).await?;
        tracing::info!("User {} logged in", user.username);
        Ok((user, pair))
    }

    /// Remove the access token with id `token_id` and its refresh token
    pub async fn logout(&self, token_id: &str) -> Result<(), AuthServiceError> {
        self.tokens.remove_access_token(token_id).await?;
        Ok(())
    }

    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthServiceError> {
        if input.password != input.plain_password {
            return Err(AuthServiceError::ValidationError(
                "The two passwords do not match".to_string(),
            ));
        }
        let mut create = CreateUserInput::new(input.username, input.password);
        create.nickname = input.nickname;
        Ok(self.users.create(create).await?)
    }

    pub async fn update_password(
        &self,
        user: &User,
        input: UpdatePasswordInput,
    ) -> Result<User, AuthServiceError> {
        if !verify_password(&input.old_password, &user.password)? {
            return Err(AuthServiceError::Forbidden("old password not matched".to_string()));
        }
        if input.password != input.plain_password {
            return Err(AuthServiceError::ValidationError(
                "The two passwords do not match".to_string(),
            ));
        }
        validate_password(&input.password)?;

        let mut user = user.clone();
        user.password = hash_password(&input.password)?;
        Ok(self.users.save(&user).await?)
    }

    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, AuthServiceError> {
        let mut user = user.clone();
        if let Some(email) = input.email {
            self.users
                .ensure_unique(UniqueField::Email, Some(&email), Some(&user.id))
                .await?;
            user.email = non_empty(Some(email));
        }
        if let Some(phone) = input.phone {
            self.users
                .ensure_unique(UniqueField::Phone, Some(&phone), Some(&user.id))
                .await?;
            user.phone = non_empty(Some(phone));
        }
        if let Some(nickname) = input.nickname {
            user.nickname = non_empty(Some(nickname));
        }
        Ok(self.users.save(&user).await?)
    }

    /// Trade a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthServiceError> {
        let unauthorized = || AuthServiceError::Unauthorized("Invalid refresh token".to_string());

        let issued = self
            .tokens
            .check_refresh_token(refresh_token)
            .await?
            .ok_or_else(unauthorized)?;
        let user = self
            .users
            .detail(&issued.access.user_id, false)
            .await
            .map_err(|_| unauthorized())?;

        match self.tokens.refresh_token(&issued, &user).await? {
            Some(pair) => Ok(pair),
            None => {
                // expired refresh tokens are dropped when presented
                if let Some(refresh) = &issued.refresh {
                    self.tokens.remove_refresh_token(&refresh.id).await?;
                }
                Err(unauthorized())
            }
        }
    }

    /// Resolve the user behind an access token.
    ///
    /// `None` when the token is unknown, belongs to a trashed user, or is
    /// expired without a live refresh token.
    pub async fn authenticate(&self, token: &str) -> Result<Option<Authenticated>, AuthServiceError> {
        let Some(issued) = self.tokens.check_access_token(token).await? else {
            return Ok(None);
        };
        let user = match self.users.detail(&issued.access.user_id, false).await {
            Ok(user) => user,
            Err(UserServiceError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !issued.access.is_expired(Utc::now()) {
            return Ok(Some(Authenticated {
                user,
                token_id: issued.access.id,
                renewed: None,
            }));
        }

        match self.tokens.refresh_token(&issued, &user).await? {
            Some(pair) => {
                tracing::debug!("Refreshed expired token for user {}", user.id);
                // the token id is the jti claim
                let token_id = self
                    .tokens
                    .verify_access_token(&pair.token)
                    .map(|claims| claims.jti)
                    .unwrap_or_default();
                Ok(Some(Authenticated {
                    user,
                    token_id,
                    renewed: Some(pair),
                }))
            }
            None => Ok(None),
        }
    }
}
