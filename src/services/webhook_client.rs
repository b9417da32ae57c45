use crate::config::{env as config_env, webhook};
use crate::error::{ClaimError, ClaimResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Settings for pushing verdicts to an oracle node job
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let enabled = std::env::var(config_env::PUSH_TO_CHAINLINK)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            enabled,
            url: non_empty_var(config_env::CHAINLINK_WEBHOOK_URL),
            api_key: non_empty_var(config_env::CHAINLINK_API_KEY),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Body posted for every evaluated claim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionNotice {
    /// Insured parcel; the pool keys policies by land
    pub policy_id: u64,
    pub claim_id: u64,
    pub land_id: u64,
    pub is_stressed: bool,
    /// Payout percentage, two decimals
    pub payout: f64,
    /// Stress probability, four decimals
    pub probability: f64,
    pub farmer_wallet: Option<String>,
}

/// What happened to a notification. Never affects the claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Skipped { reason: String },
    Delivered { status_code: u16, body: String },
    Failed { error: String },
}

/// Client for the prediction push webhook
#[derive(Debug, Clone)]
pub struct PredictionWebhook {
    client: Client,
    config: WebhookConfig,
}

impl PredictionWebhook {
    pub fn new(config: WebhookConfig) -> ClaimResult<Self> {
        let client = Client::builder()
            .timeout(webhook::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClaimError::config(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> ClaimResult<Self> {
        Self::new(WebhookConfig::from_env())
    }

    /// Post a notice. Failures are reported in the outcome, never raised.
    pub async fn push(&self, notice: &PredictionNotice) -> NotificationOutcome {
        if !self.config.enabled {
            return NotificationOutcome::Skipped {
                reason: format!("{}=false", config_env::PUSH_TO_CHAINLINK),
            };
        }
        let Some(url) = &self.config.url else {
            log::warn!(
                "Prediction push enabled but {} is not set",
                config_env::CHAINLINK_WEBHOOK_URL
            );
            return NotificationOutcome::Skipped {
                reason: format!("missing {}", config_env::CHAINLINK_WEBHOOK_URL),
            };
        };

        let mut request = self.client.post(url).json(notice);
        if let Some(key) = &self.config.api_key {
            request = request.header(webhook::API_KEY_HEADER, key);
        }

        match request.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                log::info!(
                    "Prediction for claim {} pushed: HTTP {}",
                    notice.claim_id,
                    status_code
                );
                NotificationOutcome::Delivered { status_code, body }
            }
            Err(e) => {
                log::warn!("Prediction push for claim {} failed: {}", notice.claim_id, e);
                NotificationOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
