//! Fire-and-forget email dispatch.
//!
//! [`Mailer::dispatch`] never blocks or fails the caller: delivery runs on a
//! background task and failures are only logged. Pending deliveries are
//! tracked so shutdown can wait for them with [`Mailer::drain`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::services::emails::OutgoingEmail;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let builder = if cfg.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
        }
        .with_context(|| format!("Invalid SMTP host: {}", cfg.smtp_host))?
        .port(cfg.smtp_port);

        let builder = if cfg.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                cfg.smtp_username.clone(),
                cfg.smtp_password.clone(),
            ))
        };

        let from = cfg
            .from_address
            .parse()
            .with_context(|| format!("Invalid from address: {}", cfg.from_address))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse().context("Invalid recipient address")?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .context("Failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// Writes a line per message instead of sending. Bodies carry tokens, so
/// only the recipient and subject are logged.
pub struct LogSender;

#[async_trait]
impl EmailSender for LogSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Email transport disabled; message not sent");
        Ok(())
    }
}

/// Keeps every message in memory. Useful for tests and local tooling.
#[derive(Default)]
pub struct MemorySender {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl MemorySender {
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for MemorySender {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Mailer {
    sender: Arc<dyn EmailSender>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl Mailer {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self {
            sender,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let sender: Arc<dyn EmailSender> = if cfg.enabled {
            info!(host = %cfg.smtp_host, port = cfg.smtp_port, "SMTP email transport enabled");
            Arc::new(SmtpSender::from_config(cfg)?)
        } else {
            Arc::new(LogSender)
        };
        Ok(Self::new(sender))
    }

    /// Queues `email` for delivery and returns immediately.
    pub fn dispatch(&self, email: OutgoingEmail) {
        let sender = Arc::clone(&self.sender);
        let task = async move {
            if let Err(e) = sender.send(&email).await {
                warn!(
                    event = "email_dispatch_failed",
                    to = %email.to,
                    subject = %email.subject,
                    error = %e,
                    "Failed to send email"
                );
            }
        };

        match self.pending.lock() {
            Ok(mut pending) => {
                while pending.try_join_next().is_some() {}
                pending.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }

    /// Waits up to `timeout` for queued deliveries to finish.
    pub async fn drain(&self, timeout: Duration) {
        let mut pending = match self.pending.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };

        if pending.is_empty() {
            return;
        }

        let remaining = pending.len();
        if tokio::time::timeout(timeout, async { while pending.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            warn!(remaining, "Timed out waiting for outgoing email");
            pending.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSender;

    #[async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _email: &OutgoingEmail) -> Result<()> {
            anyhow::bail!("relay unreachable")
        }
    }

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "a@example.com".into(),
            subject: "hello".into(),
            html_body: "<p>hi</p>".into(),
        }
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let sender = Arc::new(MemorySender::default());
        let mailer = Mailer::new(sender.clone());

        mailer.dispatch(email());
        mailer.drain(Duration::from_secs(5)).await;

        assert_eq!(sender.sent(), vec![email()]);
    }

    #[tokio::test]
    async fn failed_delivery_is_swallowed() {
        let mailer = Mailer::new(Arc::new(FailingSender));
        mailer.dispatch(email());
        mailer.drain(Duration::from_secs(5)).await;
    }
}
