//! HTTP client for the key-insights webhook
//!
//! `GET <url>?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD&patient_id=<id>`
//! answers `{"key_insights": ["...", ...]}`.

use std::time::Duration;

use serde::Deserialize;

use crate::analytics::DateRange;
use crate::config::WebhookConfig;
use crate::error::{Error, Result};

use super::markup::render_key_insights;

/// Response body of the webhook
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KeyInsightsResponse {
    #[serde(default)]
    pub key_insights: Vec<String>,
}

/// HTTP client for the summary webhook
pub struct WebhookClient {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookClient {
    /// Create a new webhook client from configuration
    ///
    /// Returns an error if the webhook is disabled or misconfigured.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        config.validate()?;
        if !config.enabled {
            return Err(Error::Config("webhook is not enabled".to_string()));
        }

        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("webhook.url is required".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, url })
    }

    /// Request URL for a patient and range
    pub fn request_url(&self, patient_id: &str, range: &DateRange) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}start_date={}&end_date={}&patient_id={}",
            self.url,
            separator,
            range.from.format("%Y-%m-%d"),
            range.to.format("%Y-%m-%d"),
            urlencoding::encode(patient_id)
        )
    }

    /// Fetch the raw key insights. One attempt, no retry.
    pub async fn fetch(&self, patient_id: &str, range: &DateRange) -> Result<KeyInsightsResponse> {
        let url = self.request_url(patient_id, range);
        tracing::debug!(patient_id, %range, "Requesting key insights");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Webhook(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let result: KeyInsightsResponse = response
                .json()
                .await
                .map_err(|e| Error::Webhook(format!("failed to parse response: {}", e)))?;
            Ok(result)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            tracing::warn!(patient_id, %status, "Key insights request failed");
            Err(Error::Webhook(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Fetch and render the key insights: blank entries dropped, bold
    /// markers converted.
    pub async fn fetch_key_insights(
        &self,
        patient_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>> {
        let response = self.fetch(patient_id, range).await?;
        Ok(render_key_insights(&response.key_insights))
    }
}

/// Synchronous wrapper for WebhookClient
///
/// Provides blocking methods for use in synchronous code.
pub struct SyncWebhookClient {
    inner: WebhookClient,
    runtime: tokio::runtime::Runtime,
}

impl SyncWebhookClient {
    /// Create a new sync client from configuration
    ///
    /// Returns None if the webhook is not enabled.
    pub fn new(config: &WebhookConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Webhook(format!("failed to create runtime: {}", e)))?;

        Ok(Some(Self {
            inner: WebhookClient::new(config.clone())?,
            runtime,
        }))
    }

    /// Fetch and render the key insights (blocking)
    pub fn fetch_key_insights(&self, patient_id: &str, range: &DateRange) -> Result<Vec<String>> {
        self.runtime
            .block_on(self.inner.fetch_key_insights(patient_id, range))
    }
}
