#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use staffgate::config::Config;
use staffgate::services::RegisterRequest;
use staffgate::services::mailer::{Mailer, MemorySender};
use staffgate::state::SharedState;

pub const PASSWORD: &str = "correct-horse";

pub fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("staffgate-it-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.tokens.jwt_secret = "integration-test-secret-0123456789abcdef".to_string();
    config.tokens.prune_enabled = false;
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;
    config.server.secure_cookies = false;
    config.observability.metrics_enabled = false;
    config
}

pub struct TestContext {
    pub state: Arc<SharedState>,
    pub outbox: Arc<MemorySender>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let outbox = Arc::new(MemorySender::default());
        let state = SharedState::with_mailer(config, Mailer::new(outbox.clone()))
            .await
            .expect("failed to build shared state");
        Self {
            state: Arc::new(state),
            outbox,
        }
    }

    /// Waits for queued mail, then returns the most recent message to `to`.
    pub async fn last_email_to(&self, to: &str) -> staffgate::services::emails::OutgoingEmail {
        self.state.mailer.drain(Duration::from_secs(5)).await;
        self.outbox
            .sent()
            .into_iter()
            .rev()
            .find(|e| e.to == to)
            .unwrap_or_else(|| panic!("no email sent to {to}"))
    }

    pub async fn emails_to(&self, to: &str) -> usize {
        self.state.mailer.drain(Duration::from_secs(5)).await;
        self.outbox.sent().iter().filter(|e| e.to == to).count()
    }

    /// Registers `email` and returns the verification token from the outbox.
    pub async fn register(&self, email: &str) -> String {
        self.state
            .account_service
            .register(register_request(email))
            .await
            .expect("registration failed");
        extract_token(&self.last_email_to(email).await.html_body)
    }

    /// Registers and verifies `email`.
    pub async fn register_verified(&self, email: &str) {
        let token = self.register(email).await;
        self.state
            .account_service
            .verify_email(&token)
            .await
            .expect("verification failed");
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        title: "Mx".to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
        accept_terms: true,
    }
}

/// Pulls the 80 character hex token out of an email body.
pub fn extract_token(body: &str) -> String {
    body.split(|c: char| !c.is_ascii_hexdigit())
        .find(|run| run.len() == 80)
        .map(str::to_string)
        .expect("email carries no token")
}
