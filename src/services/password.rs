//! Argon2id password hashing and opaque token generation.
//!
//! Hashing and verification are CPU-bound; the async wrappers run them on the
//! blocking pool so request handlers keep making progress under load.

use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::constants::tokens::OPAQUE_TOKEN_BYTES;

#[derive(Debug, Clone)]
pub struct PasswordHasherConfig {
    memory_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl From<&SecurityConfig> for PasswordHasherConfig {
    fn from(cfg: &SecurityConfig) -> Self {
        Self {
            memory_cost_kib: cfg.argon2_memory_cost_kib,
            time_cost: cfg.argon2_time_cost,
            parallelism: cfg.argon2_parallelism,
        }
    }
}

impl PasswordHasherConfig {
    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash_blocking(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    pub async fn hash(&self, password: &str) -> Result<String> {
        let hasher = self.clone();
        let password = password.to_string();
        task::spawn_blocking(move || hasher.hash_blocking(&password))
            .await
            .context("Password hashing task panicked")?
    }

    /// Checks `password` against a stored PHC string. The parameters encoded in
    /// the hash are used, so hashes made under older settings still verify.
    pub async fn verify(&self, password: &str, password_hash: &str) -> Result<bool> {
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;
            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")?
    }
}

/// Hex string of [`OPAQUE_TOKEN_BYTES`] random bytes, used for refresh,
/// verification and reset tokens.
#[must_use]
pub fn random_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);

    bytes
        .iter()
        .fold(String::with_capacity(OPAQUE_TOKEN_BYTES * 2), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
}
