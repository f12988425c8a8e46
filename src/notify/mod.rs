//! Outbound mail delivery for run reports.
//!
//! Two interchangeable transport strategies: handing the message to the
//! local sendmail binary, or submitting it to an authenticated SMTP relay.
//! Dispatch is best-effort; a failure never affects the run outcome.

pub mod sendmail;
pub mod smtp;

pub use sendmail::SendmailNotifier;
pub use smtp::SmtpNotifier;

use crate::config::{MailConfig, MailTransport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use tracing::{debug, warn};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<()>;
}

/// Builds the transport strategy the configuration selects.
pub fn from_config(config: &MailConfig) -> Result<Box<dyn NotificationSink>> {
    match config.transport {
        MailTransport::Sendmail => Ok(Box::new(SendmailNotifier::new(
            &config.from,
            config.sendmail_command.as_deref(),
        ))),
        MailTransport::Smtp => {
            let smtp = config
                .smtp
                .as_ref()
                .context("smtp transport selected but no smtp settings configured")?;
            Ok(Box::new(SmtpNotifier::new(&config.from, smtp)?))
        }
    }
}

/// Best-effort dispatch: errors are logged and swallowed.
pub async fn dispatch(config: &MailConfig, subject: &str, body: &str, html_body: Option<&str>) {
    if !config.enabled {
        debug!("Mail dispatch disabled, skipping");
        return;
    }

    let result = match from_config(config) {
        Ok(sink) => {
            sink.deliver(&config.recipient, subject, body, html_body)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => debug!(recipient = %config.recipient, "Report mail dispatched"),
        Err(e) => warn!(error = %e, "Report mail dispatch failed"),
    }
}

pub(crate) fn build_message(
    from: &str,
    recipient: &str,
    subject: &str,
    body: &str,
    html_body: Option<&str>,
) -> Result<Message> {
    let builder = Message::builder()
        .from(
            from.parse::<Mailbox>()
                .with_context(|| format!("Invalid from address: {from}"))?,
        )
        .to(recipient
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid recipient address: {recipient}"))?)
        .subject(subject);

    let message = match html_body {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            body.to_string(),
            html.to_string(),
        ))?,
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?,
    };
    Ok(message)
}
