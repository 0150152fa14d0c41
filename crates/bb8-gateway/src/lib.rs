use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use bb8_common::{Command, Config, Settings};
use bb8_core::{Access, AccessPolicy, Rejection, chunk, chunk_output, resolve};
use bb8_discord::{DiscordGateway, strip_mention};
use bb8_exec::RemoteExecutor;
use tracing::{debug, info, warn};

pub const TRUNCATION_NOTICE: &str = "_output truncated_";
const CODE_FENCE_OVERHEAD: usize = "```\n".len() + "\n```".len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user: String,
    pub channel: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(user: impl Into<String>, channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            channel: channel.into(),
            text: text.into(),
        }
    }
}

/// Turns chat messages into replies: access check, resolution, remote
/// execution and output chunking. Holds no per-conversation state.
pub struct BotRuntime<E> {
    config: Arc<Config>,
    executor: E,
    transport_limit: Option<usize>,
}

impl<E: RemoteExecutor> BotRuntime<E> {
    pub fn new(config: Arc<Config>, executor: E) -> Self {
        Self {
            config,
            executor,
            transport_limit: None,
        }
    }

    /// Caps every outgoing message at `limit` characters, fences included.
    pub fn with_transport_limit(mut self, limit: usize) -> Self {
        self.transport_limit = Some(limit);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Handles a raw chat message. `None` means it was not addressed to the bot.
    pub fn handle(&self, inbound: &InboundMessage, bot_id: &str) -> Option<Vec<String>> {
        let action = strip_mention(&inbound.text, bot_id)?;
        Some(self.handle_action(&inbound.user, &inbound.channel, action))
    }

    /// Handles action text that already had the mention prefix removed.
    pub fn handle_action(&self, user: &str, channel: &str, action: &str) -> Vec<String> {
        info!(user, channel, "handling action");
        let access = AccessPolicy::from_settings(self.config.settings()).check(user, channel);
        if let Some(denial) = access.denial_message() {
            match access {
                Access::UserDenied => warn!(user, "user doesn't have enough permissions"),
                _ => warn!(channel, "channel doesn't have enough permissions"),
            }
            return self.plain_reply(denial.to_string());
        }

        let invocation = match resolve(action.trim(), &self.config) {
            Ok(invocation) => invocation,
            Err(Rejection::Format(err)) => {
                warn!(error = %err, "command template could not be formatted");
                return self.plain_reply(format!("error execution action: {err}"));
            }
            Err(rejection) => return self.plain_reply(rejection.to_string()),
        };

        match self.executor.execute(
            invocation.host,
            &invocation.raw_command,
            invocation.command.timeout,
        ) {
            Ok(output) => render_output(
                &output,
                invocation.command,
                self.config.settings(),
                self.transport_limit,
            ),
            Err(err) => {
                warn!(error = %format!("{err:#}"), host = %invocation.host.id, "execution failed");
                self.plain_reply(format!("error execution action: {err:#}"))
            }
        }
    }

    /// Help, denial and error text: never fenced, only split to fit the transport.
    fn plain_reply(&self, text: String) -> Vec<String> {
        match self.transport_limit {
            Some(limit) => chunk(&text, limit, 0),
            None => vec![text],
        }
    }
}

/// Splits command output into messages using the command's limits.
pub fn render_output(
    output: &str,
    command: &Command,
    settings: &Settings,
    transport_limit: Option<usize>,
) -> Vec<String> {
    let mut max_symbols = command.max_symbols_per_message;
    if let Some(limit) = transport_limit {
        let overhead = if settings.wrap_code_block {
            CODE_FENCE_OVERHEAD
        } else {
            0
        };
        let cap = limit.saturating_sub(overhead).max(1);
        max_symbols = if max_symbols == 0 {
            cap
        } else {
            max_symbols.min(cap)
        };
    }

    let chunked = chunk_output(output, max_symbols, command.max_messages);
    debug!(
        chunks = chunked.chunks.len(),
        truncated = chunked.truncated,
        "output chunked"
    );
    let mut messages: Vec<String> = chunked
        .chunks
        .into_iter()
        .map(|chunk| {
            if settings.wrap_code_block {
                format!("```\n{chunk}\n```")
            } else {
                chunk
            }
        })
        .collect();
    if chunked.truncated && settings.report_truncation {
        messages.push(TRUNCATION_NOTICE.to_string());
    }
    messages
}

/// Polls configured Discord channels and answers messages that mention the bot.
pub struct DiscordPoller<'a, E> {
    gateway: &'a DiscordGateway,
    runtime: &'a BotRuntime<E>,
    bot_id: String,
    cursors: BTreeMap<String, Option<String>>,
}

impl<'a, E: RemoteExecutor> DiscordPoller<'a, E> {
    pub fn new(
        gateway: &'a DiscordGateway,
        runtime: &'a BotRuntime<E>,
        bot_id: impl Into<String>,
        channels: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            gateway,
            runtime,
            bot_id: bot_id.into(),
            cursors: channels.into_iter().map(|c| (c, None)).collect(),
        }
    }

    /// Moves every cursor past the newest existing message so history is not replayed.
    pub fn prime(&mut self) -> Result<()> {
        for (channel, cursor) in self.cursors.iter_mut() {
            *cursor = self.gateway.latest_message_id(channel)?;
            debug!(channel, cursor = ?cursor, "channel cursor primed");
        }
        Ok(())
    }

    /// One pass over every channel. Returns how many messages were answered.
    pub fn poll_once(&mut self) -> usize {
        let mut handled = 0;
        let channels: Vec<String> = self.cursors.keys().cloned().collect();
        for channel in channels {
            let after = self.cursors.get(&channel).cloned().flatten();
            let messages = match self.gateway.messages_after(&channel, after.as_deref()) {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(channel, error = %format!("{err:#}"), "failed to poll channel");
                    continue;
                }
            };
            for message in messages {
                self.cursors
                    .insert(channel.clone(), Some(message.id.clone()));
                if message.author.bot {
                    continue;
                }
                let inbound =
                    InboundMessage::new(message.author.id, message.channel_id, message.content);
                let Some(replies) = self.runtime.handle(&inbound, &self.bot_id) else {
                    continue;
                };
                handled += 1;
                for reply in replies {
                    if let Err(err) = self.gateway.post(&inbound.channel, &reply) {
                        warn!(channel = %inbound.channel, error = %format!("{err:#}"), "failed to send reply");
                    }
                }
            }
        }
        handled
    }

    pub fn run(&mut self, interval: Duration) -> Result<()> {
        self.prime()?;
        info!(
            channels = self.cursors.len(),
            interval_ms = interval.as_millis() as u64,
            "polling discord channels"
        );
        loop {
            self.poll_once();
            thread::sleep(interval);
        }
    }
}
