use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::SmsConfig;

/// Outbound SMS delivery. The gateway is a replaceable collaborator; the
/// message body carries the plaintext OTP and is never logged.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), String>;
}

/// Generic HTTP SMS gateway: POST {"to", "body"} with bearer auth and a
/// bounded timeout, so a stuck provider fails fast instead of hanging the
/// request.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
}

impl HttpSmsGateway {
    pub fn new(config: &SmsConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("SMS client error: {e}"))?;

        Ok(Self {
            client,
            gateway_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SmsSender for HttpSmsGateway {
    async fn send(&self, to: &str, body: &str) -> Result<(), String> {
        let response = self
            .client
            .post(&self.gateway_url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "to": to, "body": body }))
            .send()
            .await
            .map_err(|e| format!("SMS gateway request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("SMS gateway returned {}", response.status()));
        }
        Ok(())
    }
}
