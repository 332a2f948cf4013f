use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Message for site administrators.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AdminMessage {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify(&self, msg: &AdminMessage) -> anyhow::Result<()>;
}

/// Posts the message as JSON to a webhook (chat room, mail relay, ...).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }
}

#[async_trait]
impl AdminNotifier for WebhookNotifier {
    async fn notify(&self, msg: &AdminMessage) -> anyhow::Result<()> {
        self.client.post(&self.url).json(msg).send().await?.error_for_status()?;
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl AdminNotifier for LogNotifier {
    async fn notify(&self, msg: &AdminMessage) -> anyhow::Result<()> {
        tracing::info!(subject = %msg.subject, "admin notification: {}", msg.body);
        Ok(())
    }
}

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire and forget. Delivery failures are logged and never reach the caller.
pub fn dispatch(notifier: Arc<dyn AdminNotifier>, msg: AdminMessage) {
    actix_web::rt::spawn(async move {
        match tokio::time::timeout(DELIVERY_TIMEOUT, notifier.notify(&msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("admin notification '{}' failed: {e:#}", msg.subject),
            Err(_) => log::warn!("admin notification '{}' timed out", msg.subject),
        }
    });
}
