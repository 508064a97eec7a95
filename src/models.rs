//! The request entity and webhook payload types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

// `<@U123>` or `<@U123|name>`
static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]*)?>").unwrap());
// `<!subteam^S123>` or `<!subteam^S123|@name>`
static GROUP_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!subteam\^([A-Z0-9]+)(?:\|[^>]*)?>").unwrap());
// `<!channel>`, `<!here>`, `<!everyone>`
static BROADCAST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!(?:channel|here|everyone)(?:\|[^>]*)?>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One in-flight delegation of a task to be accepted by exactly one of
/// several candidates.
///
/// `timed_out`, `rejected` and `{pending}` stay pairwise disjoint: a user
/// moves out of `pending` before entering either set, and resolution never
/// offers a request to someone already in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Store key; assigned on first persistence and stable afterwards
    pub id: Option<Uuid>,
    /// User who issued the request; never a candidate
    pub requester: String,
    /// Channel the request originated in, where the outcome is announced
    pub channel: String,
    /// Original unprocessed command text
    pub raw_text: String,
    /// Task description with mentions and markers stripped
    pub task_text: String,
    /// Users explicitly mentioned in the command text
    pub user_refs: BTreeSet<String>,
    /// Usergroups explicitly mentioned in the command text
    pub group_refs: BTreeSet<String>,
    /// Whole-channel marker was present; widens the pool to channel members
    pub broadcast: bool,
    /// Contacted users whose response window lapsed
    pub timed_out: BTreeSet<String>,
    /// Contacted users who declined
    pub rejected: BTreeSet<String>,
    /// The user currently being asked, if any
    pub pending: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// Parse a raw command text into a fresh request. Mentions and
    /// broadcast markers are collected, then stripped from the task
    /// description; leftover whitespace is collapsed.
    pub fn parse(
        raw_text: impl Into<String>,
        requester: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let raw_text = raw_text.into();

        let user_refs = USER_MENTION
            .captures_iter(&raw_text)
            .map(|c| c[1].to_string())
            .collect();
        let group_refs = GROUP_MENTION
            .captures_iter(&raw_text)
            .map(|c| c[1].to_string())
            .collect();
        let broadcast = BROADCAST_MARKER.is_match(&raw_text);

        let text = USER_MENTION.replace_all(&raw_text, "");
        let text = GROUP_MENTION.replace_all(&text, "");
        let text = BROADCAST_MARKER.replace_all(&text, "");
        let task_text = WHITESPACE.replace_all(&text, " ").trim().to_string();

        Self {
            id: None,
            requester: requester.into(),
            channel: channel.into(),
            raw_text,
            task_text,
            user_refs,
            group_refs,
            broadcast,
            timed_out: BTreeSet::new(),
            rejected: BTreeSet::new(),
            pending: None,
            created_at: Utc::now(),
        }
    }
}

/// Interactive-button payload, delivered as a JSON document inside the
/// `payload` form field.
#[derive(Debug, Deserialize)]
pub struct InteractionPayload {
    pub token: String,
    pub callback_id: String,
    pub user: InteractionUser,
    pub channel: InteractionChannel,
    pub actions: Vec<InteractionAction>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionUser {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractionChannel {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractionAction {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extracts_user_mentions() {
        let request = Request::parse("<@U1> <@U2|bob> please do X", "U0", "C1");
        assert_eq!(
            request.user_refs,
            ["U1", "U2"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(request.task_text, "please do X");
    }

    #[test]
    fn test_parse_extracts_group_mentions() {
        let request = Request::parse("<!subteam^S42|@backend> fix the build", "U0", "C1");
        assert_eq!(
            request.group_refs,
            ["S42"].iter().map(|s| s.to_string()).collect()
        );
        assert!(request.user_refs.is_empty());
        assert_eq!(request.task_text, "fix the build");
    }

    #[test]
    fn test_parse_detects_broadcast_markers() {
        for marker in ["<!channel>", "<!here>", "<!everyone>"] {
            let request = Request::parse(format!("{} water the plants", marker), "U0", "C1");
            assert!(request.broadcast, "marker {} not detected", marker);
            assert_eq!(request.task_text, "water the plants");
        }
    }

    #[test]
    fn test_parse_without_broadcast_marker() {
        let request = Request::parse("<@U1> do it", "U0", "C1");
        assert!(!request.broadcast);
    }

    #[test]
    fn test_parse_normalizes_whitespace() {
        let request = Request::parse("  <@U1>   review \n the   doc  <@U2> ", "U0", "C1");
        assert_eq!(request.task_text, "review the doc");
    }

    #[test]
    fn test_parse_deduplicates_mentions() {
        let request = Request::parse("<@U1> <@U1> twice", "U0", "C1");
        assert_eq!(request.user_refs.len(), 1);
    }

    #[test]
    fn test_parse_keeps_raw_text() {
        let raw = "<@U1> please do X";
        let request = Request::parse(raw, "U0", "C1");
        assert_eq!(request.raw_text, raw);
    }

    #[test]
    fn test_parse_starts_without_id_or_pending() {
        let request = Request::parse("<@U1> task", "U0", "C1");
        assert!(request.id.is_none());
        assert!(request.pending.is_none());
        assert!(request.timed_out.is_empty());
        assert!(request.rejected.is_empty());
    }

    #[test]
    fn test_parse_mention_only_text() {
        let request = Request::parse("<@U1><@U2>", "U0", "C1");
        assert_eq!(request.task_text, "");
        assert_eq!(request.user_refs.len(), 2);
    }

    #[test]
    fn test_interaction_payload_deserialization() {
        let json = r#"{
            "token": "secret",
            "callback_id": "11111111-2222-3333-4444-555555555555:U0",
            "user": {"id": "U1", "name": "alice"},
            "channel": {"id": "C1", "name": "general"},
            "actions": [{"name": "yes", "type": "button", "value": "yes"}]
        }"#;
        let payload: InteractionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.token, "secret");
        assert_eq!(payload.user.id, "U1");
        assert_eq!(payload.channel.id, "C1");
        assert_eq!(payload.actions[0].name, "yes");
    }
}
