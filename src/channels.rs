//! Outbound channel senders (email, SMS, push).
//!
//! Every sender reports failure as `AppError::SendFailure`. Callers turn that
//! into a `failed` follow-up; nothing here retries.

use async_trait::async_trait;
use failsafe::CircuitBreaker;
use phonenumber::country::Id as CountryId;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::circuit_breaker::{create_channel_circuit_breaker, ChannelCircuitBreaker};
use crate::errors::AppError;
use crate::models::{Channel, StrategyId};
use crate::validation::{is_valid_email, validate_phone};

/// Message handed to a channel sender.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub follow_up_id: Uuid,
    pub strategy_id: StrategyId,
    pub client_email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError>;
}

fn http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// POSTs a JSON body to a provider behind a circuit breaker.
async fn post_guarded(
    client: &reqwest::Client,
    breaker: &ChannelCircuitBreaker,
    provider: &str,
    url: &str,
    api_key: &str,
    body: serde_json::Value,
) -> Result<(), AppError> {
    if !breaker.is_call_permitted() {
        tracing::warn!("{} circuit open, skipping send", provider);
        return Err(AppError::SendFailure(format!(
            "{} provider unavailable (circuit open)",
            provider
        )));
    }

    let outcome = async {
        let response = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::SendFailure(format!("{} request failed: {}", provider, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::SendFailure(format!(
                "{} returned {}: {}",
                provider, status, error_text
            )));
        }

        Ok(())
    }
    .await;

    match breaker.call(|| outcome) {
        Ok(()) => Ok(()),
        Err(failsafe::Error::Inner(e)) => Err(e),
        Err(failsafe::Error::Rejected) => Err(AppError::SendFailure(format!(
            "{} provider unavailable (circuit open)",
            provider
        ))),
    }
}

/// Sends follow-ups through the transactional email provider.
pub struct EmailSender {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    breaker: ChannelCircuitBreaker,
}

impl EmailSender {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client()?,
            base_url,
            api_key,
            breaker: create_channel_circuit_breaker(),
        })
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        if !is_valid_email(&message.client_email) {
            return Err(AppError::SendFailure(format!(
                "Invalid recipient address {}",
                message.client_email
            )));
        }

        let url = format!("{}/send", self.base_url.trim_end_matches('/'));
        tracing::info!(
            "Sending email follow-up {} to {}",
            message.follow_up_id,
            message.client_email
        );

        post_guarded(
            &self.client,
            &self.breaker,
            "Email",
            &url,
            &self.api_key,
            json!({
                "to": message.client_email,
                "subject": message.subject,
                "body": message.body,
            }),
        )
        .await?;

        tracing::info!("✓ Email follow-up {} sent", message.follow_up_id);
        Ok(())
    }
}

/// SMS delivery. The SMS gateway is not wired yet: numbers are validated and
/// the send is simulated as successful.
pub struct SmsSender {
    region: CountryId,
}

impl SmsSender {
    pub fn new(region: CountryId) -> Self {
        Self { region }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        let raw = message.phone.as_deref().ok_or_else(|| {
            AppError::SendFailure(format!(
                "No phone number on record for {}",
                message.client_email
            ))
        })?;

        let (valid, normalized) = validate_phone(raw, self.region);
        if !valid {
            return Err(AppError::SendFailure(format!(
                "Cannot send SMS to {}: {}",
                raw, normalized
            )));
        }

        tracing::info!(
            "SMS follow-up {} to {} (simulated): {}",
            message.follow_up_id,
            normalized,
            message.subject
        );
        Ok(())
    }
}

/// Sends follow-ups as push notifications.
pub struct PushSender {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    breaker: ChannelCircuitBreaker,
}

impl PushSender {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client()?,
            base_url,
            api_key,
            breaker: create_channel_circuit_breaker(),
        })
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        let url = format!("{}/notifications", self.base_url.trim_end_matches('/'));
        tracing::info!(
            "Sending push follow-up {} to {}",
            message.follow_up_id,
            message.client_email
        );

        post_guarded(
            &self.client,
            &self.breaker,
            "Push",
            &url,
            &self.api_key,
            json!({
                "title": message.subject,
                "body": message.body,
                "metadata": {
                    "client_email": message.client_email,
                    "follow_up_id": message.follow_up_id,
                    "strategy_id": message.strategy_id,
                },
            }),
        )
        .await?;

        tracing::info!("✓ Push follow-up {} sent", message.follow_up_id);
        Ok(())
    }
}

/// Channel → sender lookup used by the follow-up service.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sender under its own channel, replacing any previous one.
    pub fn register(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn sender(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&channel).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.senders.keys().copied().collect();
        channels.sort();
        channels
    }
}
