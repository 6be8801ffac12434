//! Slack direct messages via `chat.postMessage`.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Delivery, Notification, NotificationItem, Notifier, NotifyError};
use crate::constants::USER_AGENT;
use crate::text::truncate_chars;

/// Slack rejects messages with too many blocks, so long digests are split.
const MAX_ITEMS_PER_MESSAGE: usize = 15;
const MAX_EXCERPT_CHARS: usize = 200;

pub struct SlackNotifier {
    bot_token: String,
    api_base: String,
    /// Channel for announcements addressed to everyone
    default_channel: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Deserialize)]
struct SlackUser {
    id: String,
}

impl SlackNotifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(bot_token: &str, api_base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            bot_token: bot_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_channel: None,
            http,
        })
    }

    #[must_use]
    pub fn with_default_channel(mut self, channel: Option<String>) -> Self {
        self.default_channel = channel.filter(|c| !c.trim().is_empty());
        self
    }

    async fn post_message(&self, body: &Value) -> Result<(), NotifyError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bot_token))
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Request(format!("Slack returned {status}")));
        }

        let parsed: SlackResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Request(format!("unreadable Slack response: {e}")))?;
        if !parsed.ok {
            return Err(NotifyError::Api(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, notification: &Notification) -> Result<Delivery, NotifyError> {
        let Some(channel) = notification.recipient.slack_id.as_deref() else {
            return Ok(Delivery::Skipped {
                reason: "user has no Slack id",
            });
        };
        if notification.items.is_empty() {
            return Ok(Delivery::Skipped {
                reason: "nothing to send",
            });
        }

        let chunks: Vec<&[NotificationItem]> =
            notification.items.chunks(MAX_ITEMS_PER_MESSAGE).collect();
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let body = message_body(channel, chunk, index + 1, total);
            self.post_message(&body).await?;
        }

        debug!(
            user_id = notification.recipient.user_id,
            messages = total,
            "Slack digest sent"
        );
        Ok(Delivery::Sent { messages: total })
    }

    async fn lookup_slack_id(&self, email: &str) -> Result<Option<String>, NotifyError> {
        let url = format!("{}/users.lookupByEmail", self.api_base);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bot_token))
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Request(format!("Slack returned {status}")));
        }

        let parsed: LookupResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Request(format!("unreadable Slack response: {e}")))?;
        match (parsed.ok, parsed.user, parsed.error) {
            (true, Some(user), _) => Ok(Some(user.id)),
            (false, _, Some(error)) if error == "users_not_found" => Ok(None),
            (_, _, error) => Err(NotifyError::Api(
                error.unwrap_or_else(|| "unknown_error".to_string()),
            )),
        }
    }

    async fn announce(&self, item: &NotificationItem) -> Result<Delivery, NotifyError> {
        let Some(channel) = self.default_channel.as_deref() else {
            return Ok(Delivery::Skipped {
                reason: "no default Slack channel configured",
            });
        };
        self.post_message(&announcement_body(channel, item)).await?;
        debug!(content_id = item.content_id, channel, "Slack announcement sent");
        Ok(Delivery::Sent { messages: 1 })
    }
}

fn message_body(channel: &str, items: &[NotificationItem], part: usize, total: usize) -> Value {
    let header = if total > 1 {
        format!("{} new items ready to share ({part}/{total})", items.len())
    } else if items.len() == 1 {
        "1 new item ready to share".to_string()
    } else {
        format!("{} new items ready to share", items.len())
    };

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": header }
        }),
        json!({ "type": "divider" }),
    ];
    for item in items {
        let mut text = format!("*<{}|{}>*", item.url, escape(&item.title));
        if let Some(excerpt) = item.excerpt.as_deref().filter(|e| !e.is_empty()) {
            text.push('\n');
            text.push_str(&escape(&truncate_chars(excerpt, MAX_EXCERPT_CHARS)));
        }
        let _ = write!(text, "\n<{}|Promote this>", item.promote_url);
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": text }
        }));
    }

    json!({
        "channel": channel,
        "text": header,
        "blocks": blocks,
        "unfurl_links": false,
    })
}

fn announcement_body(channel: &str, item: &NotificationItem) -> Value {
    let mut text = format!(
        "*Please help promote this*\n*<{}|{}>*",
        item.url,
        escape(&item.title)
    );
    if let Some(excerpt) = item.excerpt.as_deref().filter(|e| !e.is_empty()) {
        let _ = write!(text, "\n_{}_", escape(&truncate_chars(excerpt, MAX_EXCERPT_CHARS)));
    }

    json!({
        "channel": channel,
        "text": format!("Please help promote: {}", item.title),
        "blocks": [
            { "type": "section", "text": { "type": "mrkdwn", "text": text } },
            {
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Promote this" },
                    "url": item.promote_url,
                    "style": "primary",
                }]
            }
        ],
        "unfurl_links": false,
    })
}

/// Escape the characters Slack treats as control sequences.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
