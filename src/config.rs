use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const ENV_PREFIX: &str = "STAFFGATE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub tokens: TokenConfig,

    pub email: EmailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" for human-readable output, "json" for one object per line.
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/staffgate.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub bind_address: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the refresh token cookie.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Base URL of the front end, used to build links in outgoing emails.
    pub public_url: String,

    /// Peers allowed to supply the client address through `X-Forwarded-For`.
    ///
    /// When empty, forwarded headers are ignored and the socket peer address
    /// is recorded as the source IP of token operations.
    pub trusted_proxy_ips: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 4000,
            cors_allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://localhost:3000".to_string(),
            ],
            secure_cookies: true,
            public_url: "http://localhost:4000".to_string(),
            trusted_proxy_ips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    pub min_password_length: usize,

    /// Revoke every active descendant of a refresh token when a revoked
    /// token is presented again.
    pub revoke_chain_on_reuse: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_password_length: 6,
            revoke_chain_on_reuse: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC secret for access tokens. Empty means a random secret is
    /// generated at startup, which invalidates access tokens on restart.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jwt_secret: String,

    pub access_token_ttl_minutes: u32,

    pub refresh_token_ttl_days: u32,

    pub reset_token_ttl_hours: u32,

    pub prune_enabled: bool,

    pub prune_cron: String,

    /// Expired refresh tokens are kept this long for audit before deletion.
    pub prune_retention_days: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            reset_token_ttl_hours: 24,
            prune_enabled: true,
            prune_cron: "0 0 3 * * *".to_string(),
            prune_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// When disabled, messages are written to the log instead of sent.
    pub enabled: bool,

    pub smtp_host: String,

    pub smtp_port: u16,

    pub smtp_username: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub smtp_password: String,

    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "noreply@staffgate.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        config
            .unwrap_or_else(|| {
                info!("No config file found, using defaults");
                Self::default()
            })
            .with_env_overrides()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Layers `STAFFGATE_<SECTION>__<KEY>` variables (or a `.env` file) over
    /// the loaded values, e.g. `STAFFGATE_TOKENS__JWT_SECRET` or
    /// `STAFFGATE_SERVER__PORT`. List keys take comma-separated values.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.layer_env(Self::env_source())
    }

    fn env_source() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("server.cors_allowed_origins")
            .with_list_parse_key("server.trusted_proxy_ips")
    }

    fn layer_env(self, env: Environment) -> Result<Self> {
        ConfigBuilder::builder()
            .add_source(ConfigBuilder::try_from(&self)?)
            .add_source(env)
            .build()
            .and_then(ConfigBuilder::try_deserialize)
            .context("Invalid STAFFGATE_* environment override")
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("staffgate").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".staffgate").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tokens.jwt_secret.is_empty() && self.tokens.jwt_secret.len() < 32 {
            anyhow::bail!("tokens.jwt_secret must be at least 32 bytes");
        }

        if self.tokens.access_token_ttl_minutes == 0
            || self.tokens.refresh_token_ttl_days == 0
            || self.tokens.reset_token_ttl_hours == 0
        {
            anyhow::bail!("Token lifetimes must be greater than zero");
        }

        if self.email.enabled
            && (self.email.smtp_host.is_empty() || self.email.from_address.is_empty())
        {
            anyhow::bail!("email.smtp_host and email.from_address are required when email is enabled");
        }

        if self.general.min_db_connections > self.general.max_db_connections {
            anyhow::bail!("general.min_db_connections cannot exceed max_db_connections");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tokens.access_token_ttl_minutes, 15);
        assert_eq!(config.tokens.refresh_token_ttl_days, 7);
        assert_eq!(config.tokens.reset_token_ttl_hours, 24);
        assert!(!config.security.revoke_chain_on_reuse);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[tokens]"));
        assert!(!toml_str.contains("jwt_secret"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [tokens]
            access_token_ttl_minutes = 5
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.tokens.access_token_ttl_minutes, 5);
        assert_eq!(config.tokens.refresh_token_ttl_days, 7);
        assert_eq!(config.server.port, 4000);
    }

    fn env(pairs: &[(&str, &str)]) -> Environment {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<config::Map<String, String>>();
        Config::env_source().source(Some(vars))
    }

    #[test]
    fn test_env_overrides_layer_over_file_values() {
        let mut file = Config::default();
        file.general.log_level = "debug".to_string();

        let config = file
            .layer_env(env(&[
                ("STAFFGATE_TOKENS__JWT_SECRET", "an-env-secret-that-is-long-enough-32b"),
                ("STAFFGATE_SERVER__PORT", "8080"),
                ("STAFFGATE_SERVER__CORS_ALLOWED_ORIGINS", "https://a.example,https://b.example"),
                ("STAFFGATE_SECURITY__REVOKE_CHAIN_ON_REUSE", "true"),
                ("STAFFGATE_GENERAL__DATABASE_PATH", "sqlite:/var/lib/staffgate.db"),
            ]))
            .unwrap();

        assert_eq!(config.tokens.jwt_secret, "an-env-secret-that-is-long-enough-32b");
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(config.security.revoke_chain_on_reuse);
        assert_eq!(config.general.database_path, "sqlite:/var/lib/staffgate.db");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.tokens.refresh_token_ttl_days, 7);
    }

    #[test]
    fn test_env_override_with_bad_value_is_rejected() {
        let result = Config::default().layer_env(env(&[("STAFFGATE_SERVER__PORT", "not-a-port")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = Config::default();
        config.tokens.jwt_secret = "too-short".to_string();
        assert!(config.validate().is_err());

        config.tokens.jwt_secret = "x".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_email_requires_host() {
        let mut config = Config::default();
        config.email.enabled = true;
        assert!(config.validate().is_err());

        config.email.smtp_host = "smtp.example.com".to_string();
        assert!(config.validate().is_ok());
    }
}
