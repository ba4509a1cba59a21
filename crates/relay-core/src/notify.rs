//! Best-effort e-mail notification of created incidents.
//!
//! [`Notifier::notify`] returns `()`: delivery problems are logged here and
//! never reach the caller, so a failed e-mail cannot change the outcome of
//! an incident that already exists.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::error::{RelayError, Result};
use crate::types::{ProjectRef, Ticket};

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, ticket: &Ticket, project: &ProjectRef);
}

// ---------------------------------------------------------------------------
// EmailNotifier
// ---------------------------------------------------------------------------

pub struct EmailNotifier {
    config: Option<EmailConfig>,
    instance_url: String,
}

impl EmailNotifier {
    /// `config = None` disables sending; every call is logged and skipped.
    pub fn new(config: Option<EmailConfig>, instance_url: impl Into<String>) -> Self {
        Self {
            config,
            instance_url: instance_url.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    async fn send(&self, config: &EmailConfig, ticket: &Ticket, project: &ProjectRef) -> Result<()> {
        let (subject, body) = compose(ticket, project, &self.instance_url);

        let mut builder = Message::builder()
            .from(parse_mailbox(&config.from)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for to in config.to.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            builder = builder.to(parse_mailbox(to)?);
        }
        let message = builder
            .body(body)
            .map_err(|e| RelayError::Notification(format!("build message: {e}")))?;

        let transport = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| RelayError::Notification(format!("smtp relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut transport = transport.port(config.port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport
            .build()
            .send(message)
            .await
            .map_err(|e| RelayError::Notification(format!("smtp send: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, ticket: &Ticket, project: &ProjectRef) {
        let Some(config) = &self.config else {
            tracing::info!(
                ticket = %ticket.number,
                "email not configured; skipping notification"
            );
            return;
        };
        match self.send(config, ticket, project).await {
            Ok(()) => tracing::info!(
                ticket = %ticket.number,
                project_key = %project.key,
                "notification sent"
            ),
            Err(e) => tracing::warn!(
                ticket = %ticket.number,
                project_key = %project.key,
                error = %e,
                "notification failed"
            ),
        }
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox> {
    raw.parse()
        .map_err(|e| RelayError::Notification(format!("invalid address '{raw}': {e}")))
}

/// Subject and plain-text body for an incident notification.
pub fn compose(ticket: &Ticket, project: &ProjectRef, instance_url: &str) -> (String, String) {
    let name = project.display_name();
    let subject = format!("[{}] Incident created for {name}", ticket.number);
    let body = format!(
        "A ServiceNow incident was created for SonarQube project '{name}' (key: {}).\n\n\
         Incident: {}\n\
         Link: {}\n",
        project.key,
        ticket.number,
        ticket.link(instance_url)
    );
    (subject, body)
}
