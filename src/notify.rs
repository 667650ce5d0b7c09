//! Best-effort notification channels: a broadcast webhook and an optional
//! direct-message API. Callers log failures and move on; nothing here may
//! stop the pipeline.

use serde::Serialize;

use crate::config::NotifyConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
pub struct BroadcastPayload {
    pub user: String,
    #[serde(rename = "prLink")]
    pub review_link: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: String,
    pub effort: String,
    #[serde(rename = "totalEffortMinutes")]
    pub total_effort_minutes: u64,
}

pub struct Notifier {
    client: reqwest::blocking::Client,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    /// Post the flat payload to the broadcast webhook.
    pub fn broadcast(&self, payload: &BroadcastPayload) -> Result<()> {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "broadcast webhook returned {status}"
            )));
        }
        Ok(())
    }

    /// Send a text direct message to a platform recipient id. Returns an
    /// error when no DM endpoint is configured; the caller treats that the
    /// same as any other notification failure.
    pub fn direct_message(&self, recipient_id: &str, text: &str) -> Result<()> {
        let url = self
            .config
            .dm_api_url
            .as_deref()
            .ok_or_else(|| AppError::Internal("no direct-message API configured".to_string()))?;

        let body = serde_json::json!({
            "receive_id": recipient_id,
            "msg_type": "text",
            "content": serde_json::json!({ "text": text }).to_string(),
        });

        let mut builder = self.client.post(url).json(&body);
        if let Some(token) = &self.config.dm_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send()?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(AppError::Internal(format!(
                "direct-message API returned {status}: {detail}"
            )));
        }
        Ok(())
    }
}

/// Direct-message body for a freshly created review request; empty parts are
/// omitted.
pub fn direct_message_text(review_url: &str, finding_key: &str, description: &str) -> String {
    let lines = [
        "A new automated fix is waiting for your review:".to_string(),
        review_url.to_string(),
        if finding_key.is_empty() {
            String::new()
        } else {
            format!("Finding: {finding_key}")
        },
        if description.is_empty() {
            String::new()
        } else {
            format!("Fix description: {description}")
        },
    ];
    lines
        .iter()
        .filter(|l| !l.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}
