//! One-shot administrative commands.

use chrono::{Duration, Utc};

use crate::config::Config;
use crate::db::Store;
use crate::services::RefreshLedger;
use crate::services::scheduler::prune_once;
use crate::services::validation::normalize_email;

pub async fn cmd_migrate(config: &Config) -> anyhow::Result<()> {
    // Opening the store runs every pending migration.
    let store = Store::new(&config.general.database_path).await?;
    println!("Database is up to date: {}", config.general.database_path);
    store.close().await
}

pub fn cmd_init() -> anyhow::Result<()> {
    if Config::create_default_if_missing()? {
        println!("Created config.toml with default settings.");
        println!("Set tokens.jwt_secret (or STAFFGATE_TOKENS__JWT_SECRET) before going to production.");
    } else {
        println!("config.toml already exists, leaving it untouched.");
    }
    Ok(())
}

pub async fn cmd_verify_account(config: &Config, email: &str) -> anyhow::Result<()> {
    let email = normalize_email(email)?;
    let store = Store::new(&config.general.database_path).await?;

    if store
        .accounts()
        .force_verify_by_email(&email, Utc::now())
        .await?
    {
        println!("Account {email} is now verified.");
    } else {
        println!("No account registered with {email}.");
    }

    store.close().await
}

pub async fn cmd_prune_tokens(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let ledger = RefreshLedger::new(
        store.clone(),
        Duration::days(i64::from(config.tokens.refresh_token_ttl_days)),
        config.security.revoke_chain_on_reuse,
    );

    let retention = Duration::days(i64::from(config.tokens.prune_retention_days));
    let removed = prune_once(&ledger, retention).await?;
    println!("Removed {removed} expired refresh token(s).");

    store.close().await
}
