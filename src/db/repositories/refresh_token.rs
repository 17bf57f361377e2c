use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::HashSet;

use crate::domain::AccountId;
use crate::entities::{accounts, prelude::*, refresh_tokens};

/// Rows written by a committed rotation, plus the owning account as read
/// inside the same transaction.
#[derive(Debug, Clone)]
pub struct Rotated {
    pub account: accounts::Model,
    pub revoked: RefreshToken,
    pub issued: RefreshToken,
}

/// A stored refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: i32,
    pub account_id: AccountId,
    pub token: String,
    pub expires: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub created_by_ip: String,
    pub revoked: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    pub replaced_by_token: Option<String>,
}

impl RefreshToken {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked.is_some()
    }

    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}

impl From<refresh_tokens::Model> for RefreshToken {
    fn from(model: refresh_tokens::Model) -> Self {
        Self {
            id: model.id,
            account_id: AccountId::new(model.account_id),
            token: model.token,
            expires: model.expires,
            created: model.created,
            created_by_ip: model.created_by_ip,
            revoked: model.revoked,
            revoked_by_ip: model.revoked_by_ip,
            replaced_by_token: model.replaced_by_token,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub account_id: AccountId,
    pub token: String,
    pub expires: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub created_by_ip: String,
}

impl From<NewRefreshToken> for refresh_tokens::ActiveModel {
    fn from(new: NewRefreshToken) -> Self {
        Self {
            account_id: Set(new.account_id.value()),
            token: Set(new.token),
            expires: Set(new.expires),
            created: Set(new.created),
            created_by_ip: Set(new.created_by_ip),
            revoked: Set(None),
            revoked_by_ip: Set(None),
            replaced_by_token: Set(None),
            ..Default::default()
        }
    }
}

pub struct RefreshTokenRepository {
    conn: DatabaseConnection,
}

impl RefreshTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, new: NewRefreshToken) -> Result<RefreshToken> {
        let active: refresh_tokens::ActiveModel = new.into();
        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert refresh token")?;
        Ok(model.into())
    }

    pub async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        let model = RefreshTokens::find()
            .filter(refresh_tokens::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query refresh token")?;
        Ok(model.map(RefreshToken::from))
    }

    pub async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<RefreshToken>> {
        let models = RefreshTokens::find()
            .filter(refresh_tokens::Column::AccountId.eq(account_id.value()))
            .order_by_asc(refresh_tokens::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list refresh tokens")?;
        Ok(models.into_iter().map(RefreshToken::from).collect())
    }

    /// Revokes `old_token` in favour of `successor` and stores the successor,
    /// both in one transaction.
    ///
    /// The revocation is a conditional update on `revoked IS NULL`; when it
    /// matches nothing (already revoked, possibly by a concurrent rotation)
    /// the transaction is rolled back and `None` is returned. The old token's
    /// revocation time equals the successor's creation time.
    pub async fn rotate(
        &self,
        old_token: &str,
        revoked_by_ip: &str,
        successor: NewRefreshToken,
    ) -> Result<Option<Rotated>> {
        let txn = self.conn.begin().await?;

        let claimed = RefreshTokens::update_many()
            .set(refresh_tokens::ActiveModel {
                revoked: Set(Some(successor.created)),
                revoked_by_ip: Set(Some(revoked_by_ip.to_string())),
                replaced_by_token: Set(Some(successor.token.clone())),
                ..Default::default()
            })
            .filter(refresh_tokens::Column::Token.eq(old_token))
            .filter(refresh_tokens::Column::Revoked.is_null())
            .exec(&txn)
            .await
            .context("Failed to revoke rotated refresh token")?;

        if claimed.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let Some(account) = Accounts::find_by_id(successor.account_id.value())
            .one(&txn)
            .await
            .context("Failed to load account for rotation")?
        else {
            txn.rollback().await?;
            return Ok(None);
        };

        let active: refresh_tokens::ActiveModel = successor.into();
        let inserted = active
            .insert(&txn)
            .await
            .context("Failed to insert successor refresh token")?;

        let revoked = RefreshTokens::find()
            .filter(refresh_tokens::Column::Token.eq(old_token))
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Rotated refresh token vanished mid-transaction"))?;

        txn.commit().await?;
        Ok(Some(Rotated {
            account,
            revoked: revoked.into(),
            issued: inserted.into(),
        }))
    }

    /// Marks `token` revoked unless it already is. Returns the updated row,
    /// or `None` when nothing changed.
    pub async fn revoke(
        &self,
        token: &str,
        revoked_by_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let result = RefreshTokens::update_many()
            .set(refresh_tokens::ActiveModel {
                revoked: Set(Some(now)),
                revoked_by_ip: Set(Some(revoked_by_ip.to_string())),
                ..Default::default()
            })
            .filter(refresh_tokens::Column::Token.eq(token))
            .filter(refresh_tokens::Column::Revoked.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to revoke refresh token")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get_by_token(token).await
    }

    /// Walks the `replaced_by_token` chain after `token` and revokes every
    /// successor that is still unrevoked. Returns how many were revoked.
    pub async fn revoke_descendants(
        &self,
        token: &str,
        revoked_by_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut seen = HashSet::new();
        let mut revoked = 0;
        let mut next = self
            .get_by_token(token)
            .await?
            .and_then(|t| t.replaced_by_token);

        while let Some(current) = next {
            if !seen.insert(current.clone()) {
                break;
            }
            // A concurrent rotation may extend the chain between reads, so the
            // successor link is taken from the row as it stands after revoking.
            let row = match self.revoke(&current, revoked_by_ip, now).await? {
                Some(row) => {
                    revoked += 1;
                    Some(row)
                }
                None => self.get_by_token(&current).await?,
            };
            next = row.and_then(|t| t.replaced_by_token);
        }

        Ok(revoked)
    }

    /// Deletes tokens whose expiry lies before `cutoff`.
    pub async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = RefreshTokens::delete_many()
            .filter(refresh_tokens::Column::Expires.lt(cutoff))
            .exec(&self.conn)
            .await
            .context("Failed to prune refresh tokens")?;
        Ok(result.rows_affected)
    }
}
