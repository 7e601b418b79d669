use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::info;

use super::{EmailMessage, Mailer};

/// Development transport: logs the envelope instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "email send stub"
        );
        Ok(())
    }
}

/// Delivers through an HTTP email API that accepts the message as JSON.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await.context("mail api request")?;
        if !response.status().is_success() {
            return Err(anyhow!("mail api returned status {}", response.status()));
        }
        Ok(())
    }
}

/// Keeps sent messages in memory. Can be switched into a failing mode to
/// exercise delivery-failure paths.
#[derive(Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
    }
}

#[async_trait]
impl Mailer for MemoryOutbox {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("outbox is in failing mode"));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
