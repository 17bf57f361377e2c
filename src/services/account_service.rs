//! Domain service for the account lifecycle.
//!
//! Registration, email verification, login, refresh token rotation and
//! revocation, password reset, and administrative account management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::RefreshToken;
use crate::domain::{AccountId, Role};
use crate::entities::accounts;
use crate::services::refresh_ledger::LedgerError;
use crate::services::token_codec::{AccessToken, TokenError};
use crate::services::validation::ValidationError;

/// Errors surfaced by account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Email or password is incorrect")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    NotVerified,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<TokenError> for AccountError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Expired => Self::ExpiredToken,
            TokenError::Signing(msg) => Self::Internal(msg),
        }
    }
}

impl From<LedgerError> for AccountError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidToken | LedgerError::TokenReuse => Self::InvalidToken,
            LedgerError::Storage(e) => e.into(),
        }
    }
}

/// Account projection returned to callers. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: AccountId,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub accept_terms: bool,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub is_verified: bool,
}

impl TryFrom<accounts::Model> for AccountView {
    type Error = AccountError;

    fn try_from(model: accounts::Model) -> Result<Self, Self::Error> {
        let role = model
            .role
            .parse::<Role>()
            .map_err(|e| AccountError::Internal(e.to_string()))?;
        let is_verified = is_verified(&model);

        Ok(Self {
            id: AccountId::new(model.id),
            title: model.title,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            role,
            accept_terms: model.accept_terms,
            created: model.created,
            updated: model.updated,
            is_verified,
        })
    }
}

/// Login eligibility: a verified email, or a completed password reset.
#[must_use]
pub const fn is_verified(model: &accounts::Model) -> bool {
    model.verified.is_some() || model.password_reset.is_some()
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: AccountId,
    pub role: Role,
}

impl Actor {
    #[must_use]
    pub fn may_access(&self, target: AccountId) -> bool {
        self.role.is_admin() || self.id == target
    }
}

impl From<&AccountView> for Actor {
    fn from(view: &AccountView) -> Self {
        Self {
            id: view.id,
            role: view.role,
        }
    }
}

/// Successful login or refresh.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub account: AccountView,
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

/// Refresh token metadata without the token value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenView {
    pub id: i32,
    pub created: DateTime<Utc>,
    pub created_by_ip: String,
    pub expires: DateTime<Utc>,
    pub revoked: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    pub is_active: bool,
}

impl From<&RefreshToken> for RefreshTokenView {
    fn from(token: &RefreshToken) -> Self {
        Self {
            id: token.id,
            created: token.created,
            created_by_ip: token.created_by_ip.clone(),
            expires: token.expires,
            revoked: token.revoked,
            revoked_by_ip: token.revoked_by_ip.clone(),
            is_active: token.is_active_at(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub accept_terms: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    pub role: Role,
}

/// Absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub role: Option<Role>,
}

/// Domain service trait for the account lifecycle.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Registers a new account and sends a verification email.
    ///
    /// An already registered email gets a notice instead, and the call still
    /// returns `Ok(())` so callers cannot learn which emails exist.
    async fn register(&self, req: RegisterRequest) -> Result<(), AccountError>;

    /// Consumes a verification token.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidToken`] if no account holds the token.
    async fn verify_email(&self, token: &str) -> Result<(), AccountError>;

    /// Checks credentials and starts a session.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] for an unknown email or a
    /// wrong password, and [`AccountError::NotVerified`] for a correct password
    /// on an account that is neither verified nor reset.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
        source_ip: &str,
    ) -> Result<AuthenticatedSession, AccountError>;

    /// Exchanges a refresh token for a new one plus a fresh access token.
    async fn refresh(
        &self,
        token: &str,
        source_ip: &str,
    ) -> Result<AuthenticatedSession, AccountError>;

    async fn revoke(&self, token: &str, source_ip: &str) -> Result<(), AccountError>;

    /// Like [`AccountService::revoke`], but a non-admin may only revoke tokens
    /// of their own account.
    async fn revoke_as(
        &self,
        actor: &Actor,
        token: &str,
        source_ip: &str,
    ) -> Result<(), AccountError>;

    /// Always succeeds for a well-formed email, whether or not it is registered.
    async fn request_password_reset(&self, email: &str) -> Result<(), AccountError>;

    async fn validate_reset_token(&self, token: &str) -> Result<AccountView, AccountError>;

    async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), AccountError>;

    /// Resolves a bearer access token to the account it was issued for.
    async fn verify_access_token(&self, token: &str) -> Result<AccountView, AccountError>;

    async fn list_accounts(&self, actor: &Actor) -> Result<Vec<AccountView>, AccountError>;

    async fn get_account(&self, actor: &Actor, id: AccountId)
    -> Result<AccountView, AccountError>;

    async fn create_account(
        &self,
        actor: &Actor,
        req: CreateAccountRequest,
    ) -> Result<AccountView, AccountError>;

    async fn update_account(
        &self,
        actor: &Actor,
        id: AccountId,
        req: UpdateAccountRequest,
    ) -> Result<AccountView, AccountError>;

    async fn delete_account(&self, actor: &Actor, id: AccountId) -> Result<(), AccountError>;

    async fn list_refresh_tokens(
        &self,
        actor: &Actor,
        id: AccountId,
    ) -> Result<Vec<RefreshTokenView>, AccountError>;
}
