use super::{NotificationSink, build_message};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{AsyncSendmailTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

/// Hands the message to the local sendmail binary.
pub struct SendmailNotifier {
    from: String,
    transport: AsyncSendmailTransport<Tokio1Executor>,
}

impl SendmailNotifier {
    pub fn new(from: &str, command: Option<&str>) -> Self {
        let transport = match command {
            Some(command) => AsyncSendmailTransport::new_with_command(command),
            None => AsyncSendmailTransport::new(),
        };
        SendmailNotifier {
            from: from.to_string(),
            transport,
        }
    }
}

#[async_trait]
impl NotificationSink for SendmailNotifier {
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
            .context("sendmail submission failed")?;
        debug!(recipient, "Message handed to sendmail");
        Ok(())
    }
}
