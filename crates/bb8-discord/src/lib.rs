//! Minimal Discord REST transport: who the bot is, what was posted after a
//! cursor, and posting replies within the message size limit.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use bb8_core::chunk;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

const API_BASE: &str = "https://discord.com/api/v10";
const HISTORY_PAGE_MAX: usize = 100;

/// Discord rejects message content longer than this many characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct DiscordGateway {
    client: Client,
    api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    pub author: Author,
}

impl ChannelMessage {
    // Snowflakes grow with time.
    fn snowflake(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Deserialize)]
struct Posted {
    id: String,
}

impl DiscordGateway {
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            bail!("discord bot token is empty");
        }
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .with_context(|| "discord bot token is not a valid header value")?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .with_context(|| "failed to build discord HTTP client")?;
        Ok(Self {
            client,
            api_base: API_BASE.to_string(),
        })
    }

    /// Points the client at another API root, e.g. a mock server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// The account behind the token. Fails fast on a revoked or mistyped token.
    pub fn current_user(&self) -> Result<BotUser> {
        let url = format!("{}/users/@me", self.api_base);
        self.call(self.client.get(url), "current user")
    }

    /// Id of the newest message in the channel, if it has any.
    pub fn latest_message_id(&self, channel_id: &str) -> Result<Option<String>> {
        let newest = self.history(channel_id, None, 1)?;
        Ok(newest.into_iter().next_back().map(|message| message.id))
    }

    /// Messages posted after `cursor`, oldest first. One page at most.
    pub fn messages_after(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<ChannelMessage>> {
        self.history(channel_id, cursor, HISTORY_PAGE_MAX)
    }

    /// Posts `content`, split at line breaks into as many messages as
    /// [`DISCORD_MESSAGE_LIMIT`] requires. Returns the ids in posting order.
    pub fn post(&self, channel_id: &str, content: &str) -> Result<Vec<String>> {
        let parts = chunk(content, DISCORD_MESSAGE_LIMIT, 0);
        if parts.is_empty() {
            bail!("refusing to post an empty message to channel {channel_id}");
        }
        if parts.len() > 1 {
            debug!(channel_id, parts = parts.len(), "reply split to fit discord");
        }

        let url = self.channel_messages_url(channel_id);
        let mut ids = Vec::with_capacity(parts.len());
        for part in parts {
            let body = json!({ "content": part, "allowed_mentions": { "parse": [] } });
            let posted: Posted = self.call(self.client.post(&url).json(&body), "post message")?;
            ids.push(posted.id);
        }
        Ok(ids)
    }

    fn history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        let mut query = vec![("limit", limit.clamp(1, HISTORY_PAGE_MAX).to_string())];
        if let Some(after) = cursor {
            query.push(("after", after.to_string()));
        }
        let request = self
            .client
            .get(self.channel_messages_url(channel_id))
            .query(&query);
        let mut messages: Vec<ChannelMessage> = self.call(request, "channel history")?;
        messages.sort_by_key(ChannelMessage::snowflake);
        Ok(messages)
    }

    fn channel_messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id.trim())
    }

    fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .with_context(|| format!("discord {what}: request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("discord {what}: HTTP {} {}", status.as_u16(), body.trim());
        }
        response
            .json::<T>()
            .with_context(|| format!("discord {what}: unexpected response body"))
    }
}

/// Returns the text after a leading `<@bot_id>` or `<@!bot_id>` mention, or
/// `None` when the message is not addressed to the bot.
pub fn strip_mention<'a>(text: &'a str, bot_id: &str) -> Option<&'a str> {
    let rest = text.strip_prefix("<@")?;
    let rest = rest.strip_prefix('!').unwrap_or(rest);
    let rest = rest.strip_prefix(bot_id)?;
    rest.strip_prefix('>')
}
