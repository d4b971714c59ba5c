//! Mention Dispatcher
//!
//! Pulls events one at a time, filters for messages that mention the bot,
//! runs the configured command, and posts its output to the message's
//! channel. Each event is handled to completion before the next is pulled,
//! so overlapping mentions queue up behind a running command.

use crate::config::{BotIdentity, Config, FailurePolicy};
use exec_common::{CommandExecutor, CommandSpec, ExecError};
use slack_common::{EventSource, InboundEvent, MessageSink, OutboundResponse, SlackError};

/// A failed dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("command execution failed: {0}")]
    Exec(#[from] ExecError),

    #[error("posting response failed: {0}")]
    Post(#[from] SlackError),
}

/// What happened to a handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a message.
    Ignored,
    /// A message that does not mention the bot.
    NoMention,
    /// The command ran and its output was posted to `channel`.
    Dispatched { channel: String },
}

pub struct Dispatcher<E, S> {
    mention_marker: String,
    command: CommandSpec,
    executor: E,
    sink: S,
    policy: FailurePolicy,
}

impl<E, S> Dispatcher<E, S>
where
    E: CommandExecutor,
    S: MessageSink,
{
    pub fn new(
        identity: &BotIdentity,
        command: CommandSpec,
        executor: E,
        sink: S,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            mention_marker: identity.mention_marker(),
            command,
            executor,
            sink,
            policy,
        }
    }

    pub fn from_config(config: &Config, executor: E, sink: S) -> Self {
        Self::new(
            &config.identity,
            config.command.clone(),
            executor,
            sink,
            config.on_error,
        )
    }

    /// Handles a single event.
    pub async fn handle(&self, event: &InboundEvent) -> Result<Outcome, DispatchError> {
        let InboundEvent::Message(message) = event else {
            tracing::trace!(kind = event.kind(), "ignoring event");
            return Ok(Outcome::Ignored);
        };

        tracing::debug!(channel = %message.channel, text = %message.text, "message received");

        if !message.text.contains(&self.mention_marker) {
            tracing::debug!(channel = %message.channel, "no mention");
            return Ok(Outcome::NoMention);
        }

        tracing::info!(channel = %message.channel, command = %self.command, "mentioned, running command");

        let output = self.executor.execute(&self.command).await?;
        let response = OutboundResponse::with_attachment_echo(&message.channel, output.text());
        self.sink.post(&response).await?;

        tracing::info!(channel = %message.channel, "posted command output");

        Ok(Outcome::Dispatched {
            channel: message.channel.clone(),
        })
    }

    /// Consumes `source` until it is exhausted.
    ///
    /// Under [`FailurePolicy::Abort`] the first failure stops the loop and is
    /// returned; nothing further is pulled from the source.
    pub async fn run<Src>(&self, source: &mut Src) -> Result<(), DispatchError>
    where
        Src: EventSource + ?Sized,
    {
        while let Some(event) = source.next_event().await {
            if let Err(e) = self.handle(&event).await {
                match self.policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Continue => {
                        tracing::error!(error = %e, "dispatch failed, continuing");
                    }
                }
            }
        }

        tracing::info!("event source closed");
        Ok(())
    }
}
