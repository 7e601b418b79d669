//! Outbound email: message type, delivery trait and transport selection.
//!
//! Flow-critical messages (verification, reset request, contact reply) are
//! awaited by the caller so a delivery failure can surface. Courtesy
//! messages (welcome, reset confirmation, contact acknowledgement) go
//! through [`send_best_effort`], which detaches the send and only logs
//! failures.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{MailConfig, MailTransport};

pub mod templates;
mod transports;

pub use templates::Template;
pub use transports::{HttpMailer, LogMailer, MemoryOutbox};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailMessage {
    pub fn new(from: &str, to: &str, template: Template) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: template.subject,
            html: template.html,
            text: template.text,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Tries the primary transport and, if it fails, the fallback, on every call.
pub struct FallbackMailer {
    primary: Arc<dyn Mailer>,
    fallback: Arc<dyn Mailer>,
}

impl FallbackMailer {
    pub fn new(primary: Arc<dyn Mailer>, fallback: Arc<dyn Mailer>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Mailer for FallbackMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        match self.primary.send(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, to = %message.to, "primary mail transport failed; using fallback");
                self.fallback.send(message).await
            }
        }
    }
}

fn transport(t: &MailTransport) -> anyhow::Result<Arc<dyn Mailer>> {
    Ok(match t {
        MailTransport::Log => Arc::new(LogMailer),
        MailTransport::Http { endpoint, api_key } => {
            Arc::new(HttpMailer::new(endpoint.clone(), api_key.clone())?)
        }
    })
}

/// Build the mailer described by configuration.
pub fn from_config(config: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    let primary = transport(&config.primary)?;
    Ok(match &config.fallback {
        Some(fallback) => Arc::new(FallbackMailer::new(primary, transport(fallback)?)),
        None => primary,
    })
}

/// Send without making the caller wait; failures are logged and dropped.
pub fn send_best_effort(mailer: Arc<dyn Mailer>, message: EmailMessage, kind: &'static str) {
    tokio::spawn(async move {
        match mailer.send(&message).await {
            Ok(()) => info!(kind, to = %message.to, "email sent"),
            Err(e) => warn!(error = %e, kind, to = %message.to, "best-effort email failed"),
        }
    });
}
