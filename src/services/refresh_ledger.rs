//! Refresh token ledger: issue, rotate, revoke, prune.
//!
//! Every refresh token is single use. Rotation revokes the presented token,
//! links it to its successor through `replaced_by_token` and stores the
//! successor, all in one transaction. Concurrent rotations of the same token
//! race on a conditional update, so exactly one of them wins.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{NewRefreshToken, RefreshToken, Store};
use crate::domain::AccountId;
use crate::entities::accounts;
use crate::services::password::random_token;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Unknown, expired, or lost a rotation race.
    #[error("Invalid refresh token")]
    InvalidToken,

    /// A revoked, unexpired token was presented again.
    #[error("Refresh token reuse detected")]
    TokenReuse,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    /// Both reuse and plain invalidity are rejections to the caller.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::TokenReuse)
    }
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub account: accounts::Model,
    pub revoked: RefreshToken,
    pub issued: RefreshToken,
}

#[derive(Clone)]
pub struct RefreshLedger {
    store: Store,
    ttl: Duration,
    revoke_chain_on_reuse: bool,
}

impl RefreshLedger {
    #[must_use]
    pub const fn new(store: Store, ttl: Duration, revoke_chain_on_reuse: bool) -> Self {
        Self {
            store,
            ttl,
            revoke_chain_on_reuse,
        }
    }

    pub async fn issue(
        &self,
        account_id: AccountId,
        source_ip: &str,
    ) -> Result<RefreshToken, LedgerError> {
        self.issue_at(account_id, source_ip, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        account_id: AccountId,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, LedgerError> {
        let token = self
            .store
            .refresh_tokens()
            .insert(self.new_token(account_id, source_ip, now))
            .await?;
        Ok(token)
    }

    pub async fn rotate(&self, token: &str, source_ip: &str) -> Result<Rotation, LedgerError> {
        self.rotate_at(token, source_ip, Utc::now()).await
    }

    pub async fn rotate_at(
        &self,
        token: &str,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Rotation, LedgerError> {
        let repo = self.store.refresh_tokens();

        let Some(existing) = repo.get_by_token(token).await? else {
            return Err(LedgerError::InvalidToken);
        };

        if existing.is_revoked() {
            if !existing.is_expired_at(now) {
                self.on_reuse(&existing, source_ip, now).await?;
                return Err(LedgerError::TokenReuse);
            }
            return Err(LedgerError::InvalidToken);
        }

        if existing.is_expired_at(now) {
            return Err(LedgerError::InvalidToken);
        }

        let successor = self.new_token(existing.account_id, source_ip, now);
        let Some(rotated) = repo.rotate(token, source_ip, successor).await? else {
            // Lost to a concurrent rotation or revocation, or the account is gone.
            return Err(LedgerError::InvalidToken);
        };

        info!(
            event = "refresh_rotated",
            account_id = %existing.account_id,
            token_id = rotated.revoked.id,
            successor_id = rotated.issued.id,
            "Refresh token rotated"
        );

        Ok(Rotation {
            account: rotated.account,
            revoked: rotated.revoked,
            issued: rotated.issued,
        })
    }

    /// Revokes a single active token. Tokens before or after it in the
    /// rotation chain are left alone.
    pub async fn revoke(&self, token: &str, source_ip: &str) -> Result<RefreshToken, LedgerError> {
        self.revoke_at(token, source_ip, Utc::now()).await
    }

    pub async fn revoke_at(
        &self,
        token: &str,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, LedgerError> {
        let repo = self.store.refresh_tokens();

        let existing = repo
            .get_by_token(token)
            .await?
            .ok_or(LedgerError::InvalidToken)?;
        if !existing.is_active_at(now) {
            return Err(LedgerError::InvalidToken);
        }

        let revoked = repo
            .revoke(token, source_ip, now)
            .await?
            .ok_or(LedgerError::InvalidToken)?;

        info!(
            event = "refresh_revoked",
            account_id = %revoked.account_id,
            token_id = revoked.id,
            "Refresh token revoked"
        );
        Ok(revoked)
    }

    /// Revokes every still-active token rotated out of `token`.
    pub async fn revoke_descendants(
        &self,
        token: &str,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        Ok(self
            .store
            .refresh_tokens()
            .revoke_descendants(token, source_ip, now)
            .await?)
    }

    /// Looks up a token without changing it.
    pub async fn find(&self, token: &str) -> Result<Option<RefreshToken>, LedgerError> {
        Ok(self.store.refresh_tokens().get_by_token(token).await?)
    }

    pub async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<RefreshToken>, LedgerError> {
        Ok(self.store.refresh_tokens().list_for_account(account_id).await?)
    }

    /// Deletes tokens that expired more than `retention` ago.
    pub async fn prune(&self, retention: Duration) -> Result<u64, LedgerError> {
        let cutoff = Utc::now() - retention;
        Ok(self.store.refresh_tokens().delete_expired_before(cutoff).await?)
    }

    fn new_token(&self, account_id: AccountId, source_ip: &str, now: DateTime<Utc>) -> NewRefreshToken {
        NewRefreshToken {
            account_id,
            token: random_token(),
            expires: now + self.ttl,
            created: now,
            created_by_ip: source_ip.to_string(),
        }
    }

    async fn on_reuse(
        &self,
        existing: &RefreshToken,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        metrics::counter!("auth_refresh_reuse_total").increment(1);

        let cascaded = if self.revoke_chain_on_reuse {
            self.revoke_descendants(&existing.token, source_ip, now).await?
        } else {
            0
        };

        warn!(
            event = "refresh_token_reuse",
            account_id = %existing.account_id,
            token_id = existing.id,
            source_ip = %source_ip,
            cascaded,
            "Revoked refresh token presented again"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::db::{NewAccount, WriteOutcome};

    async fn setup(revoke_chain_on_reuse: bool) -> (RefreshLedger, AccountId) {
        let store = temp_store().await;
        let outcome = store
            .accounts()
            .register(NewAccount {
                email: "owner@example.com".into(),
                password_hash: "hash".into(),
                title: "Dr".into(),
                first_name: "Ada".into(),
                last_name: "Byron".into(),
                accept_terms: true,
                verification_token: None,
                verified: Some(Utc::now()),
                created: Utc::now(),
            })
            .await
            .unwrap();
        let WriteOutcome::Saved(account) = outcome else {
            panic!("account not created");
        };

        let ledger = RefreshLedger::new(store, Duration::days(7), revoke_chain_on_reuse);
        (ledger, AccountId::new(account.id))
    }

    #[tokio::test]
    async fn issue_creates_active_token() {
        let (ledger, account_id) = setup(false).await;
        let now = Utc::now();

        let token = ledger.issue_at(account_id, "10.0.0.1", now).await.unwrap();

        assert!(token.is_active_at(now));
        assert_eq!(token.expires, now + Duration::days(7));
        assert_eq!(token.created_by_ip, "10.0.0.1");
        assert!(token.token.len() >= 40);
    }

    #[tokio::test]
    async fn rotation_links_old_to_new() {
        let (ledger, account_id) = setup(false).await;
        let first = ledger.issue(account_id, "ip1").await.unwrap();

        let rotation = ledger.rotate(&first.token, "ip2").await.unwrap();

        assert_eq!(rotation.account.id, account_id.value());
        assert!(rotation.revoked.is_revoked());
        assert_eq!(rotation.revoked.revoked_by_ip.as_deref(), Some("ip2"));
        assert_eq!(
            rotation.revoked.replaced_by_token.as_deref(),
            Some(rotation.issued.token.as_str())
        );
        assert_eq!(rotation.revoked.revoked, Some(rotation.issued.created));
        assert!(rotation.issued.is_active_at(Utc::now()));

        let again = ledger.rotate(&first.token, "ip3").await.unwrap_err();
        assert!(again.is_rejection());
    }

    #[tokio::test]
    async fn unknown_and_expired_tokens_are_invalid() {
        let (ledger, account_id) = setup(false).await;
        let issued_at = Utc::now() - Duration::days(8);
        let stale = ledger.issue_at(account_id, "ip", issued_at).await.unwrap();

        assert!(matches!(
            ledger.rotate("nope", "ip").await,
            Err(LedgerError::InvalidToken)
        ));
        assert!(matches!(
            ledger.rotate(&stale.token, "ip").await,
            Err(LedgerError::InvalidToken)
        ));
        assert!(matches!(
            ledger.revoke(&stale.token, "ip").await,
            Err(LedgerError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn rotation_after_account_deletion_is_invalid() {
        let (ledger, account_id) = setup(false).await;
        let now = Utc::now();
        let token = ledger.issue_at(account_id, "10.0.0.1", now).await.unwrap();

        assert!(ledger.store.accounts().delete(account_id).await.unwrap());

        let err = ledger
            .rotate_at(&token.token, "10.0.0.2", now + Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidToken));
        assert!(ledger
            .store
            .refresh_tokens()
            .list_for_account(account_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotation_has_one_winner() {
        let (ledger, account_id) = setup(false).await;
        let original = ledger.issue(account_id, "ip").await.unwrap();

        let (a, b) = tokio::join!(
            ledger.rotate(&original.token, "ip-a"),
            ledger.rotate(&original.token, "ip-b")
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(loser.unwrap_err().is_rejection());

        let active: Vec<_> = ledger
            .list_for_account(account_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.is_active_at(Utc::now()))
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn revoke_does_not_cascade() {
        let (ledger, account_id) = setup(false).await;
        let first = ledger.issue(account_id, "ip").await.unwrap();
        let second = ledger.rotate(&first.token, "ip").await.unwrap().issued;
        let third = ledger.rotate(&second.token, "ip").await.unwrap().issued;

        let revoked = ledger.revoke(&third.token, "ip9").await.unwrap();
        assert_eq!(revoked.revoked_by_ip.as_deref(), Some("ip9"));
        assert!(revoked.replaced_by_token.is_none());

        assert!(matches!(
            ledger.revoke(&third.token, "ip9").await,
            Err(LedgerError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn reuse_without_cascade_leaves_successor_active() {
        let (ledger, account_id) = setup(false).await;
        let first = ledger.issue(account_id, "ip").await.unwrap();
        let second = ledger.rotate(&first.token, "ip").await.unwrap().issued;

        assert!(matches!(
            ledger.rotate(&first.token, "attacker").await,
            Err(LedgerError::TokenReuse)
        ));

        let second = ledger.find(&second.token).await.unwrap().unwrap();
        assert!(second.is_active_at(Utc::now()));
    }

    #[tokio::test]
    async fn reuse_with_cascade_revokes_descendants() {
        let (ledger, account_id) = setup(true).await;
        let first = ledger.issue(account_id, "ip").await.unwrap();
        let second = ledger.rotate(&first.token, "ip").await.unwrap().issued;
        let third = ledger.rotate(&second.token, "ip").await.unwrap().issued;

        assert!(ledger.rotate(&first.token, "attacker").await.is_err());

        let third = ledger.find(&third.token).await.unwrap().unwrap();
        assert!(third.is_revoked());
        assert_eq!(third.revoked_by_ip.as_deref(), Some("attacker"));
        assert!(matches!(
            ledger.rotate(&third.token, "ip").await,
            Err(LedgerError::TokenReuse)
        ));
    }

    #[tokio::test]
    async fn prune_deletes_only_long_expired() {
        let (ledger, account_id) = setup(false).await;
        let ancient = Utc::now() - Duration::days(60);
        ledger.issue_at(account_id, "ip", ancient).await.unwrap();
        let current = ledger.issue(account_id, "ip").await.unwrap();

        let removed = ledger.prune(Duration::days(30)).await.unwrap();

        assert_eq!(removed, 1);
        let remaining = ledger.list_for_account(account_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, current.token);
    }
}
