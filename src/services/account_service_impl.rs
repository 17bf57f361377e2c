//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{AccountChanges, NewAccount, Store, WriteOutcome};
use crate::domain::AccountId;
use crate::services::account_service::{
    AccountError, AccountService, AccountView, Actor, AuthenticatedSession, CreateAccountRequest,
    RefreshTokenView, RegisterRequest, ResetPasswordRequest, UpdateAccountRequest, is_verified,
};
use crate::services::emails;
use crate::services::mailer::Mailer;
use crate::services::password::{PasswordHasherConfig, random_token};
use crate::services::refresh_ledger::{LedgerError, RefreshLedger};
use crate::services::token_codec::TokenCodec;
use crate::services::validation::{
    ValidationError, normalize_email, require_text, require_token, validate_new_password,
};

/// Settings the lifecycle needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub min_password_length: usize,
    pub reset_token_ttl: Duration,
    pub public_url: String,
}

impl AccountSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_password_length: config.security.min_password_length,
            reset_token_ttl: Duration::hours(i64::from(config.tokens.reset_token_ttl_hours)),
            public_url: config.server.public_url.clone(),
        }
    }
}

pub struct SeaOrmAccountService {
    store: Store,
    codec: TokenCodec,
    ledger: RefreshLedger,
    mailer: Mailer,
    hasher: PasswordHasherConfig,
    settings: AccountSettings,
}

impl SeaOrmAccountService {
    #[must_use]
    pub const fn new(
        store: Store,
        codec: TokenCodec,
        ledger: RefreshLedger,
        mailer: Mailer,
        hasher: PasswordHasherConfig,
        settings: AccountSettings,
    ) -> Self {
        Self {
            store,
            codec,
            ledger,
            mailer,
            hasher,
            settings,
        }
    }

    fn login_failed(email: &str, reason: &'static str) {
        metrics::counter!("auth_logins_total", "outcome" => reason).increment(1);
        warn!(event = "login_failed", email = %email, reason, "Login rejected");
    }

    async fn find_account(&self, id: AccountId) -> Result<AccountView, AccountError> {
        self.store
            .accounts()
            .get_by_id(id)
            .await?
            .ok_or(AccountError::AccountNotFound)?
            .try_into()
    }
}

fn require_admin(actor: &Actor) -> Result<(), AccountError> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        Err(AccountError::Forbidden)
    }
}

fn require_access(actor: &Actor, target: AccountId) -> Result<(), AccountError> {
    if actor.may_access(target) {
        Ok(())
    } else {
        Err(AccountError::Forbidden)
    }
}

/// Treats empty strings in partial updates as absent.
fn provided(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn register(&self, req: RegisterRequest) -> Result<(), AccountError> {
        let title = require_text("title", &req.title)?;
        let first_name = require_text("firstName", &req.first_name)?;
        let last_name = require_text("lastName", &req.last_name)?;
        let email = normalize_email(&req.email)?;
        validate_new_password(
            &req.password,
            &req.confirm_password,
            self.settings.min_password_length,
        )?;
        if !req.accept_terms {
            return Err(ValidationError::new("acceptTerms", "Terms must be accepted").into());
        }

        // Hash before touching the table so known and unknown emails cost the same.
        let password_hash = self.hasher.hash(&req.password).await?;
        let verification_token = random_token();

        let outcome = self
            .store
            .accounts()
            .register(NewAccount {
                email: email.clone(),
                password_hash,
                title,
                first_name,
                last_name,
                accept_terms: true,
                verification_token: Some(verification_token.clone()),
                verified: None,
                created: Utc::now(),
            })
            .await?;

        match outcome {
            WriteOutcome::Saved(account) => {
                info!(
                    event = "account_registered",
                    account_id = account.id,
                    role = %account.role,
                    "Account registered"
                );
                self.mailer
                    .dispatch(emails::verification(&account.email, &verification_token));
            }
            WriteOutcome::EmailTaken => {
                info!(
                    event = "account_registered",
                    duplicate = true,
                    "Registration for existing email; sending notice"
                );
                self.mailer
                    .dispatch(emails::already_registered(&email, &self.settings.public_url));
            }
        }

        Ok(())
    }

    async fn verify_email(&self, token: &str) -> Result<(), AccountError> {
        let token = require_token("token", token)?;

        if !self
            .store
            .accounts()
            .consume_verification_token(token, Utc::now())
            .await?
        {
            return Err(AccountError::InvalidToken);
        }

        info!(event = "email_verified", "Email verified");
        Ok(())
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &str,
        source_ip: &str,
    ) -> Result<AuthenticatedSession, AccountError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ValidationError::new("email", "Email is required").into());
        }
        if password.is_empty() {
            return Err(ValidationError::new("password", "Password is required").into());
        }

        let Some(model) = self.store.accounts().get_by_email(&email).await? else {
            Self::login_failed(&email, "unknown_email");
            return Err(AccountError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &model.password_hash).await? {
            Self::login_failed(&email, "wrong_password");
            return Err(AccountError::InvalidCredentials);
        }

        if !is_verified(&model) {
            Self::login_failed(&email, "not_verified");
            return Err(AccountError::NotVerified);
        }

        let account = AccountView::try_from(model)?;
        let access_token = self.codec.issue(account.id)?;
        let refresh_token = self.ledger.issue(account.id, source_ip).await?;

        metrics::counter!("auth_logins_total", "outcome" => "success").increment(1);
        info!(
            event = "login_succeeded",
            account_id = %account.id,
            source_ip = %source_ip,
            "Login succeeded"
        );

        Ok(AuthenticatedSession {
            account,
            access_token,
            refresh_token,
        })
    }

    async fn refresh(
        &self,
        token: &str,
        source_ip: &str,
    ) -> Result<AuthenticatedSession, AccountError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AccountError::InvalidToken);
        }

        let rotation = match self.ledger.rotate(token, source_ip).await {
            Ok(rotation) => rotation,
            Err(e) => {
                let outcome = match &e {
                    LedgerError::TokenReuse => "reuse",
                    LedgerError::InvalidToken => "invalid",
                    LedgerError::Storage(_) => "error",
                };
                metrics::counter!("auth_refresh_total", "outcome" => outcome).increment(1);
                return Err(e.into());
            }
        };

        let account = AccountView::try_from(rotation.account)?;
        let access_token = self.codec.issue(account.id)?;

        metrics::counter!("auth_refresh_total", "outcome" => "success").increment(1);

        Ok(AuthenticatedSession {
            account,
            access_token,
            refresh_token: rotation.issued,
        })
    }

    async fn revoke(&self, token: &str, source_ip: &str) -> Result<(), AccountError> {
        let token = require_token("token", token)?;
        self.ledger.revoke(token, source_ip).await?;
        Ok(())
    }

    async fn revoke_as(
        &self,
        actor: &Actor,
        token: &str,
        source_ip: &str,
    ) -> Result<(), AccountError> {
        let token = require_token("token", token)?;

        if !actor.role.is_admin() {
            let owner = self
                .ledger
                .find(token)
                .await?
                .ok_or(AccountError::InvalidToken)?
                .account_id;
            if owner != actor.id {
                return Err(AccountError::Forbidden);
            }
        }

        self.revoke(token, source_ip).await
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        let email = normalize_email(email)?;

        let Some(account) = self.store.accounts().get_by_email(&email).await? else {
            info!(event = "password_reset_requested", known = false, "Password reset requested");
            return Ok(());
        };

        let token = random_token();
        let expires = Utc::now() + self.settings.reset_token_ttl;
        self.store
            .accounts()
            .set_reset_token(AccountId::new(account.id), &token, expires)
            .await?;

        info!(
            event = "password_reset_requested",
            known = true,
            account_id = account.id,
            "Password reset requested"
        );

        let hours = u32::try_from(self.settings.reset_token_ttl.num_hours()).unwrap_or(u32::MAX);
        self.mailer
            .dispatch(emails::password_reset(&account.email, &token, hours));
        Ok(())
    }

    async fn validate_reset_token(&self, token: &str) -> Result<AccountView, AccountError> {
        let token = require_token("token", token)?;

        self.store
            .accounts()
            .get_by_active_reset_token(token, Utc::now())
            .await?
            .ok_or(AccountError::InvalidToken)?
            .try_into()
    }

    async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), AccountError> {
        let token = require_token("token", &req.token)?;
        validate_new_password(
            &req.password,
            &req.confirm_password,
            self.settings.min_password_length,
        )?;

        let account = self.validate_reset_token(token).await?;
        let password_hash = self.hasher.hash(&req.password).await?;

        // The token may have been consumed while hashing.
        if !self
            .store
            .accounts()
            .consume_reset_token(token, password_hash, Utc::now())
            .await?
        {
            return Err(AccountError::InvalidToken);
        }

        info!(event = "password_reset", account_id = %account.id, "Password reset");
        Ok(())
    }

    async fn verify_access_token(&self, token: &str) -> Result<AccountView, AccountError> {
        let account_id = self.codec.verify(token)?;

        match self.find_account(account_id).await {
            Err(AccountError::AccountNotFound) => Err(AccountError::InvalidToken),
            other => other,
        }
    }

    async fn list_accounts(&self, actor: &Actor) -> Result<Vec<AccountView>, AccountError> {
        require_admin(actor)?;

        self.store
            .accounts()
            .list_all()
            .await?
            .into_iter()
            .map(AccountView::try_from)
            .collect()
    }

    async fn get_account(
        &self,
        actor: &Actor,
        id: AccountId,
    ) -> Result<AccountView, AccountError> {
        require_access(actor, id)?;
        self.find_account(id).await
    }

    async fn create_account(
        &self,
        actor: &Actor,
        req: CreateAccountRequest,
    ) -> Result<AccountView, AccountError> {
        require_admin(actor)?;

        let title = require_text("title", &req.title)?;
        let first_name = require_text("firstName", &req.first_name)?;
        let last_name = require_text("lastName", &req.last_name)?;
        let email = normalize_email(&req.email)?;
        validate_new_password(
            &req.password,
            &req.confirm_password,
            self.settings.min_password_length,
        )?;

        let password_hash = self.hasher.hash(&req.password).await?;
        let now = Utc::now();

        let outcome = self
            .store
            .accounts()
            .create_with_role(
                NewAccount {
                    email,
                    password_hash,
                    title,
                    first_name,
                    last_name,
                    accept_terms: false,
                    verification_token: None,
                    verified: Some(now),
                    created: now,
                },
                req.role,
            )
            .await?;

        match outcome {
            WriteOutcome::Saved(model) => {
                info!(
                    event = "account_created",
                    account_id = model.id,
                    by = %actor.id,
                    "Account created by administrator"
                );
                model.try_into()
            }
            WriteOutcome::EmailTaken => Err(AccountError::EmailTaken),
        }
    }

    async fn update_account(
        &self,
        actor: &Actor,
        id: AccountId,
        req: UpdateAccountRequest,
    ) -> Result<AccountView, AccountError> {
        require_access(actor, id)?;
        if req.role.is_some() && !actor.role.is_admin() {
            return Err(AccountError::Forbidden);
        }

        let accounts = self.store.accounts();
        let existing = accounts
            .get_by_id(id)
            .await?
            .ok_or(AccountError::AccountNotFound)?;

        let mut changes = AccountChanges {
            role: req.role,
            ..AccountChanges::default()
        };
        if let Some(title) = provided(req.title.as_ref()) {
            changes.title = Some(require_text("title", title)?);
        }
        if let Some(first_name) = provided(req.first_name.as_ref()) {
            changes.first_name = Some(require_text("firstName", first_name)?);
        }
        if let Some(last_name) = provided(req.last_name.as_ref()) {
            changes.last_name = Some(require_text("lastName", last_name)?);
        }
        if let Some(email) = provided(req.email.as_ref()) {
            let email = normalize_email(email)?;
            if email != existing.email {
                if accounts.get_by_email(&email).await?.is_some() {
                    return Err(AccountError::EmailTaken);
                }
                changes.email = Some(email);
            }
        }
        if let Some(password) = provided(req.password.as_ref()) {
            validate_new_password(
                password,
                req.confirm_password.as_deref().unwrap_or_default(),
                self.settings.min_password_length,
            )?;
            changes.password_hash = Some(self.hasher.hash(password).await?);
        }

        match accounts.update(existing, changes, Utc::now()).await? {
            WriteOutcome::Saved(model) => {
                info!(event = "account_updated", account_id = %id, by = %actor.id, "Account updated");
                model.try_into()
            }
            WriteOutcome::EmailTaken => Err(AccountError::EmailTaken),
        }
    }

    async fn delete_account(&self, actor: &Actor, id: AccountId) -> Result<(), AccountError> {
        require_access(actor, id)?;

        if !self.store.accounts().delete(id).await? {
            return Err(AccountError::AccountNotFound);
        }

        info!(event = "account_deleted", account_id = %id, by = %actor.id, "Account deleted");
        Ok(())
    }

    async fn list_refresh_tokens(
        &self,
        actor: &Actor,
        id: AccountId,
    ) -> Result<Vec<RefreshTokenView>, AccountError> {
        require_access(actor, id)?;
        self.find_account(id).await?;

        let tokens = self.ledger.list_for_account(id).await?;
        Ok(tokens.iter().map(RefreshTokenView::from).collect())
    }
}
