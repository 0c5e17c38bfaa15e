/*!

`Notifier` implemented as a Slack-compatible incoming webhook: every call POSTs a `{"text": ...}`
JSON body and treats any non-2xx response as a failure.

!*/

pub mod error;

use async_trait::async_trait;
use error::Error;
use log::debug;
use roller_core::backend::{BackendResult, Notifier};
use serde::Serialize;
use snafu::ResultExt;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }

    async fn send(&self, text: &str) -> Result<(), Error> {
        debug!("Sending webhook notification ({} byte(s))", text.len());
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&WebhookPayload { text })
            .send()
            .await
            .context(error::SendSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return error::BadResponseSnafu { status, body }.fail();
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, text: &str) -> BackendResult<()> {
        self.send(text).await.map_err(|e| e.to_string())
    }
}

/// A `Notifier` that only logs; used when no webhook is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, text: &str) -> BackendResult<()> {
        debug!("(no webhook configured) {}", text);
        Ok(())
    }
}
