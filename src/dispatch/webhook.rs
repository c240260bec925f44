//! HTTP webhook delivery.

use super::{NotificationPayload, NotificationSink};
use crate::entry::{Status, TransitionEvent};
use crate::error::{MonitorError, Result};
use crate::settings::WebhookSettings;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Posts each event as JSON to one of two URLs, chosen by status.
///
/// Any 2xx response is success. Everything else, including transport errors
/// and timeouts, is reported as a failure without retrying.
///
/// # Examples
///
/// ```rust,no_run
/// use camhook::dispatch::WebhookSink;
/// use std::time::Duration;
///
/// # fn example() -> camhook::error::Result<()> {
/// let sink = WebhookSink::builder()
///     .with_on_url("http://homeassistant.local:8123/api/webhook/webcam_on")
///     .with_off_url("http://homeassistant.local:8123/api/webhook/webcam_off")
///     .with_timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct WebhookSink {
    client: Client,
    on_url: String,
    off_url: String,
}

impl WebhookSink {
    /// Create a new builder for constructing a webhook sink.
    pub fn builder() -> WebhookSinkBuilder {
        WebhookSinkBuilder::new()
    }

    /// Build a sink from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is missing or the client cannot be built.
    pub fn from_settings(settings: &WebhookSettings) -> Result<Self> {
        let mut builder = Self::builder().with_timeout(settings.timeout());
        if let Some(url) = &settings.on_url {
            builder = builder.with_on_url(url);
        }
        if let Some(url) = &settings.off_url {
            builder = builder.with_off_url(url);
        }
        builder.build()
    }

    /// URL used for events with the given status.
    pub fn url_for(&self, status: Status) -> &str {
        match status {
            Status::On => &self.on_url,
            Status::Off => &self.off_url,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, event: &TransitionEvent) -> Result<()> {
        let url = self.url_for(event.status());
        let payload = NotificationPayload::from(event);

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MonitorError::Dispatch(format!("HTTP request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::HttpStatus {
                status: status.as_u16(),
            });
        }

        tracing::debug!(url, status = status.as_u16(), "Webhook called successfully");
        Ok(())
    }

    fn name(&self) -> String {
        format!("webhook:{}|{}", self.on_url, self.off_url)
    }
}

/// Builder for constructing a [`WebhookSink`].
pub struct WebhookSinkBuilder {
    on_url: Option<String>,
    off_url: Option<String>,
    timeout: Duration,
}

impl WebhookSinkBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            on_url: None,
            off_url: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// URL posted to when a camera turns on.
    pub fn with_on_url(mut self, url: impl Into<String>) -> Self {
        self.on_url = Some(url.into());
        self
    }

    /// URL posted to when a camera turns off.
    pub fn with_off_url(mut self, url: impl Into<String>) -> Self {
        self.off_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    ///
    /// Default is 10 seconds. This bounds how long one stuck call can hold
    /// up the dispatcher.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either URL is missing
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> Result<WebhookSink> {
        let on_url = self
            .on_url
            .ok_or_else(|| MonitorError::Other("webhook on_url is required".to_string()))?;
        let off_url = self
            .off_url
            .ok_or_else(|| MonitorError::Other("webhook off_url is required".to_string()))?;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| MonitorError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(WebhookSink {
            client,
            on_url,
            off_url,
        })
    }
}

impl Default for WebhookSinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
