//! Slack Web API binding for the directory and messenger contracts

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::chat::{Directory, Messenger, Notice};
use crate::error::DirectoryError;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct SlackError(String);

impl From<SlackError> for DirectoryError {
    fn from(e: SlackError) -> Self {
        DirectoryError(e.0)
    }
}

/// Thin client over the Slack Web API. The base URL is configurable so
/// tests can point it at a mock server.
pub struct SlackClient {
    client: Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<ApiResponse, SlackError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await
            .map_err(|e| SlackError(format!("{}: {}", method, e)))?;

        if !response.status().is_success() {
            return Err(SlackError(format!(
                "{} returned {}",
                method,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SlackError(format!("{} sent a malformed body: {}", method, e)))
    }
}

#[async_trait]
impl Directory for SlackClient {
    async fn resolve_group(&self, group_id: &str) -> Result<BTreeSet<String>, DirectoryError> {
        let data = self
            .call(
                "usergroups.users.list",
                &[("usergroup", group_id), ("include_disabled", "false")],
            )
            .await?;

        // An unknown or disabled group contributes nothing
        if !data.ok {
            tracing::debug!(
                group = group_id,
                error = data.error.as_deref().unwrap_or("unknown"),
                "usergroup did not resolve"
            );
            return Ok(BTreeSet::new());
        }

        Ok(data.users.unwrap_or_default().into_iter().collect())
    }

    async fn channel_members(&self, channel_id: &str) -> Result<BTreeSet<String>, DirectoryError> {
        let data = self
            .call("conversations.members", &[("channel", channel_id)])
            .await?;

        if !data.ok {
            return Err(DirectoryError(format!(
                "conversations.members failed: {}",
                data.error.as_deref().unwrap_or("unknown error")
            )));
        }

        Ok(data.members.unwrap_or_default().into_iter().collect())
    }

    async fn is_active(&self, user_id: &str) -> Result<bool, DirectoryError> {
        let data = self.call("users.getPresence", &[("user", user_id)]).await?;

        if !data.ok {
            return Err(DirectoryError(format!(
                "users.getPresence failed: {}",
                data.error.as_deref().unwrap_or("unknown error")
            )));
        }

        Ok(data.presence.as_deref() == Some("active"))
    }
}

#[async_trait]
impl Messenger for SlackClient {
    async fn send_private(&self, channel_id: &str, user_id: &str, notice: Notice) {
        let attachments = attachments_json(&notice);
        let params = [
            ("channel", channel_id),
            ("user", user_id),
            ("text", notice.text.as_str()),
            ("attachments", attachments.as_str()),
        ];

        match self.call("chat.postEphemeral", &params).await {
            Ok(data) if !data.ok => tracing::error!(
                user = user_id,
                error = data.error.as_deref().unwrap_or("unknown"),
                "chat.postEphemeral rejected"
            ),
            Ok(_) => tracing::debug!(user = user_id, "sent private message"),
            Err(e) => tracing::error!(user = user_id, "failed to send private message: {}", e),
        }
    }

    async fn send_public(&self, channel_id: &str, notice: Notice) {
        let attachments = attachments_json(&notice);
        let params = [
            ("channel", channel_id),
            ("text", notice.text.as_str()),
            ("attachments", attachments.as_str()),
        ];

        match self.call("chat.postMessage", &params).await {
            Ok(data) if !data.ok => tracing::error!(
                channel = channel_id,
                error = data.error.as_deref().unwrap_or("unknown"),
                "chat.postMessage rejected"
            ),
            Ok(_) => tracing::debug!(channel = channel_id, "sent public message"),
            Err(e) => tracing::error!(
                channel = channel_id,
                "failed to send public message: {}",
                e
            ),
        }
    }
}

/// Render a notice's attachments the way the Slack message API expects
/// them: quoted lines first, then the accept/reject buttons if present.
fn attachments_json(notice: &Notice) -> String {
    let mut attachments: Vec<serde_json::Value> = notice
        .attachments
        .iter()
        .map(|text| json!({ "text": text }))
        .collect();

    if let Some(prompt) = &notice.prompt {
        attachments.push(json!({
            "text": prompt.text,
            "callback_id": prompt.callback_id,
            "attachment_type": "default",
            "actions": [
                { "name": "yes", "text": "Accept", "type": "button", "value": "yes", "style": "primary" },
                { "name": "no", "text": "Reject", "type": "button", "value": "no", "style": "danger" },
            ],
        }));
    }

    serde_json::to_string(&attachments).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    users: Option<Vec<String>>,
    #[serde(default)]
    members: Option<Vec<String>>,
    #[serde(default)]
    presence: Option<String>,
}
