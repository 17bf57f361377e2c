use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::Store;
use crate::services::mailer::Mailer;
use crate::services::password::PasswordHasherConfig;
use crate::services::{
    AccountService, AccountSettings, RefreshLedger, Scheduler, SeaOrmAccountService, TokenCodec,
};

/// How long shutdown waits for queued emails.
const MAIL_DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Process-wide context handed to every component.
///
/// Built once by [`SharedState::new`] and read-only afterwards; tear it down
/// with [`SharedState::shutdown`].
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub codec: TokenCodec,

    pub ledger: RefreshLedger,

    pub mailer: Mailer,

    pub scheduler: Arc<Scheduler>,

    pub account_service: Arc<dyn AccountService>,
}

impl SharedState {
    pub async fn new(config: Config) -> Result<Self> {
        let mailer = Mailer::from_config(&config.email)?;
        Self::with_mailer(config, mailer).await
    }

    /// Initialises in dependency order: validated config, signing secret,
    /// storage, ledger, then the account service on top of them.
    pub async fn with_mailer(config: Config, mailer: Mailer) -> Result<Self> {
        config.validate()?;

        let codec = TokenCodec::from_config(&config.tokens);

        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let ledger = RefreshLedger::new(
            store.clone(),
            Duration::days(i64::from(config.tokens.refresh_token_ttl_days)),
            config.security.revoke_chain_on_reuse,
        );

        let scheduler = Arc::new(Scheduler::new(ledger.clone(), config.tokens.clone()));

        let account_service: Arc<dyn AccountService> = Arc::new(SeaOrmAccountService::new(
            store.clone(),
            codec.clone(),
            ledger.clone(),
            mailer.clone(),
            PasswordHasherConfig::from(&config.security),
            AccountSettings::from_config(&config),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            codec,
            ledger,
            mailer,
            scheduler,
            account_service,
        })
    }

    /// Reverse of initialisation. The pool is closed last.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down");
        self.scheduler.stop().await?;
        self.mailer.drain(MAIL_DRAIN_TIMEOUT).await;
        self.store.clone().close().await
    }
}
