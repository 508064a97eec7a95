//! Contracts the lifecycle engine consumes: directory queries and message
//! delivery. The Slack binding lives in `slack`; tests inject fakes.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::DirectoryError;

/// An accept/reject prompt attached to a private message. The callback id
/// is the correlation token round-tripped through the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePrompt {
    pub callback_id: String,
    pub text: String,
}

/// One outward notification: lead text, quoted attachment lines, and an
/// optional response prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub attachments: Vec<String>,
    pub prompt: Option<ResponsePrompt>,
}

impl Notice {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
            prompt: None,
        }
    }

    /// Add a quoted attachment line under the lead text.
    pub fn quote(mut self, line: impl Into<String>) -> Self {
        self.attachments.push(line.into());
        self
    }

    /// Attach accept/reject controls carrying the given callback id.
    pub fn with_prompt(mut self, callback_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.prompt = Some(ResponsePrompt {
            callback_id: callback_id.into(),
            text: text.into(),
        });
        self
    }
}

/// Group membership, channel membership and presence lookups.
///
/// Pure queries against the chat platform; results reflect directory state
/// at call time and are never cached by callers.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Current members of a usergroup. A group that cannot be resolved
    /// contributes an empty set, not an error.
    async fn resolve_group(&self, group_id: &str) -> Result<BTreeSet<String>, DirectoryError>;

    /// Current members of a channel.
    async fn channel_members(&self, channel_id: &str) -> Result<BTreeSet<String>, DirectoryError>;

    /// Whether the user is currently active and reachable.
    async fn is_active(&self, user_id: &str) -> Result<bool, DirectoryError>;
}

/// Message delivery. Failures are logged by implementations and never
/// surfaced to the engine; retry policy, if any, belongs here.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Message visible to a single recipient inside a channel.
    async fn send_private(&self, channel_id: &str, user_id: &str, notice: Notice);

    /// Message visible to every channel member.
    async fn send_public(&self, channel_id: &str, notice: Notice);
}
