use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use super::is_unique_violation;
use crate::domain::{AccountId, Role};
use crate::entities::{accounts, prelude::*, refresh_tokens};

/// Row data for an account that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub accept_terms: bool,
    pub verification_token: Option<String>,
    pub verified: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
}

impl AccountChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
    }
}

#[derive(Debug)]
pub enum WriteOutcome {
    Saved(accounts::Model),
    EmailTaken,
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<accounts::Model>> {
        Accounts::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query account by ID")
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<accounts::Model>> {
        Accounts::find()
            .filter(accounts::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query account by email")
    }

    /// Account holding `token` as its reset token, provided the token has not expired at `now`.
    pub async fn get_by_active_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<accounts::Model>> {
        let account = Accounts::find()
            .filter(accounts::Column::ResetToken.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query account by reset token")?;

        Ok(account.filter(|a| a.reset_token_expires.is_some_and(|exp| exp > now)))
    }

    pub async fn list_all(&self) -> Result<Vec<accounts::Model>> {
        Accounts::find()
            .order_by_asc(accounts::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list accounts")
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Accounts::find().count(&self.conn).await?)
    }

    /// Inserts a self-registered account.
    ///
    /// The role is decided inside the insert transaction: if the new row is the
    /// only one in the table it becomes Admin, otherwise User. Two concurrent
    /// first registrations therefore cannot both end up Admin.
    pub async fn register(&self, new: NewAccount) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;

        let inserted = match Self::insert_in(&txn, new, Role::User).await? {
            WriteOutcome::Saved(model) => model,
            WriteOutcome::EmailTaken => {
                txn.rollback().await?;
                return Ok(WriteOutcome::EmailTaken);
            }
        };

        let total = Accounts::find().count(&txn).await?;
        let model = if total == 1 {
            let mut active: accounts::ActiveModel = inserted.into();
            active.role = Set(Role::Admin.as_str().to_string());
            active.update(&txn).await?
        } else {
            inserted
        };

        txn.commit().await?;
        Ok(WriteOutcome::Saved(model))
    }

    /// Inserts an account with an explicit role (administrative create).
    pub async fn create_with_role(&self, new: NewAccount, role: Role) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;
        let outcome = Self::insert_in(&txn, new, role).await?;
        match outcome {
            WriteOutcome::Saved(_) => txn.commit().await?,
            WriteOutcome::EmailTaken => txn.rollback().await?,
        }
        Ok(outcome)
    }

    async fn insert_in(
        txn: &DatabaseTransaction,
        new: NewAccount,
        role: Role,
    ) -> Result<WriteOutcome> {
        let active = accounts::ActiveModel {
            email: Set(new.email),
            password_hash: Set(new.password_hash),
            title: Set(new.title),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            accept_terms: Set(new.accept_terms),
            role: Set(role.as_str().to_string()),
            verification_token: Set(new.verification_token),
            verified: Set(new.verified),
            reset_token: Set(None),
            reset_token_expires: Set(None),
            password_reset: Set(None),
            created: Set(new.created),
            updated: Set(None),
            ..Default::default()
        };

        match active.insert(txn).await {
            Ok(model) => Ok(WriteOutcome::Saved(model)),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::EmailTaken),
            Err(e) => Err(e).context("Failed to insert account"),
        }
    }

    /// Consumes a verification token. Returns false when no account holds it,
    /// including when a concurrent call consumed it first.
    pub async fn consume_verification_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = Accounts::update_many()
            .set(accounts::ActiveModel {
                verified: Set(Some(now)),
                verification_token: Set(None),
                ..Default::default()
            })
            .filter(accounts::Column::VerificationToken.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to consume verification token")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn set_reset_token(
        &self,
        id: AccountId,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<()> {
        Accounts::update_many()
            .set(accounts::ActiveModel {
                reset_token: Set(Some(token.to_string())),
                reset_token_expires: Set(Some(expires)),
                ..Default::default()
            })
            .filter(accounts::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to store reset token")?;
        Ok(())
    }

    /// Replaces the password of the account holding an unexpired `token` and
    /// clears the token in the same statement, so a token is usable once.
    pub async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = Accounts::update_many()
            .set(accounts::ActiveModel {
                password_hash: Set(password_hash),
                password_reset: Set(Some(now)),
                reset_token: Set(None),
                reset_token_expires: Set(None),
                updated: Set(Some(now)),
                ..Default::default()
            })
            .filter(accounts::Column::ResetToken.eq(token))
            .filter(accounts::Column::ResetTokenExpires.gt(now))
            .exec(&self.conn)
            .await
            .context("Failed to consume reset token")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn update(
        &self,
        existing: accounts::Model,
        changes: AccountChanges,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        if changes.is_empty() {
            return Ok(WriteOutcome::Saved(existing));
        }

        let mut active: accounts::ActiveModel = existing.into();
        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(first_name) = changes.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = changes.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(hash) = changes.password_hash {
            active.password_hash = Set(hash);
        }
        if let Some(role) = changes.role {
            active.role = Set(role.as_str().to_string());
        }
        active.updated = Set(Some(now));

        match active.update(&self.conn).await {
            Ok(model) => Ok(WriteOutcome::Saved(model)),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::EmailTaken),
            Err(e) => Err(e).context("Failed to update account"),
        }
    }

    /// Deletes the account and every refresh token it owns.
    pub async fn delete(&self, id: AccountId) -> Result<bool> {
        let txn = self.conn.begin().await?;

        RefreshTokens::delete_many()
            .filter(refresh_tokens::Column::AccountId.eq(id.value()))
            .exec(&txn)
            .await?;

        let result = Accounts::delete_by_id(id.value()).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    /// Marks an account verified without a token (operator override).
    pub async fn force_verify_by_email(&self, email: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = Accounts::update_many()
            .set(accounts::ActiveModel {
                verified: Set(Some(now)),
                verification_token: Set(None),
                ..Default::default()
            })
            .filter(accounts::Column::Email.eq(email))
            .exec(&self.conn)
            .await
            .context("Failed to verify account")?;

        Ok(result.rows_affected > 0)
    }
}
