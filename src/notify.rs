/// Marketing webhook
///
/// Fire-and-forget JSON posts for email capture. Nothing in the purchase flow
/// depends on the response; failures are logged and dropped.
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::WebhookSettings;
use crate::error::Error;

/// Email capture payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingSignup {
    pub submission_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub source: String,
    pub submitted_at: DateTime<Utc>,
}

impl MarketingSignup {
    pub fn new(email: &str, source: &str) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            email: email.trim().to_string(),
            wallet_address: None,
            chain_id: None,
            source: source.to_string(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_wallet(mut self, address: alloy_primitives::Address, chain_id: u64) -> Self {
        self.wallet_address = Some(address.to_string());
        self.chain_id = Some(chain_id);
        self
    }
}

/// Posts signups to the configured webhook, if any
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: Option<Url>,
}

impl WebhookNotifier {
    pub fn new(settings: &WebhookSettings) -> Result<Self, Error> {
        let url = settings
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(|u| Url::parse(u).map_err(|e| Error::Config(format!("Invalid webhook URL '{}': {}", u, e))))
            .transpose()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Webhook(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, url })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Post the signup and wait for the response status
    pub async fn send(&self, signup: &MarketingSignup) -> Result<(), Error> {
        let Some(url) = &self.url else {
            return Ok(());
        };

        let response = self
            .http_client
            .post(url.clone())
            .json(signup)
            .send()
            .await
            .map_err(|e| Error::Webhook(format!("Failed to post signup: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }
        debug!(submission_id = %signup.submission_id, "Signup delivered");
        Ok(())
    }

    /// Post on a background task; errors are logged, never returned
    pub fn submit(&self, signup: MarketingSignup) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            debug!("Webhook disabled, signup dropped");
            return None;
        }
        let notifier = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = notifier.send(&signup).await {
                warn!(submission_id = %signup.submission_id, error = %e, "Signup webhook failed");
            }
        }))
    }
}
