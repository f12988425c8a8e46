use super::{NotificationSink, build_message};
use crate::config::SmtpConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

/// Submits the message to an authenticated SMTP relay over STARTTLS.
pub struct SmtpNotifier {
    from: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(from: &str, config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("Invalid SMTP relay host: {}", config.host))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(SmtpNotifier {
            from: from.to_string(),
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl NotificationSink for SmtpNotifier {
    async fn deliver(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<()> {
        let message = build_message(&self.from, recipient, subject, body, html_body)?;
        self.transport
            .send(message)
            .await
            .context("smtp submission failed")?;
        debug!(recipient, "Message submitted over smtp");
        Ok(())
    }
}
