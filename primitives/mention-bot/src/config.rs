//! Command-line configuration.

use clap::{Parser, ValueEnum};
use exec_common::CommandSpec;
use std::time::Duration;

/// Slack bot that runs a command when mentioned.
#[derive(Parser, Debug, Clone)]
#[command(name = "mention-bot")]
#[command(about = "Runs a local command when mentioned in Slack and posts its output")]
pub struct Args {
    /// Slack bot token (xoxb-...).
    #[arg(short, long, env = "MENTION_BOT_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Slack app-level token for socket mode (xapp-...).
    #[arg(short, long, env = "MENTION_BOT_APP_TOKEN", default_value = "", hide_env_values = true)]
    pub app_token: String,

    /// Id of the bot user, used to detect mentions.
    #[arg(short, long, env = "MENTION_BOT_BOT_ID", default_value = "U8HV269AT")]
    pub bot_id: String,

    /// Command to run on mention (program followed by space-separated arguments).
    #[arg(short, long, env = "MENTION_BOT_CMD", default_value = "echo foo bar cat")]
    pub cmd: String,

    /// Command timeout in seconds (0 = wait forever).
    #[arg(long, env = "MENTION_BOT_TIMEOUT_SECS", default_value = "0")]
    pub timeout_secs: u64,

    /// What to do when running the command or posting its output fails.
    #[arg(long, env = "MENTION_BOT_ON_ERROR", value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_error: FailurePolicy,

    /// Slack Web API base URL.
    #[arg(long, env = "MENTION_BOT_API_BASE", default_value = slack_common::DEFAULT_API_BASE)]
    pub api_base: String,
}

/// Reaction to a failed dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Stop the event loop and exit non-zero.
    #[default]
    Abort,
    /// Log the failure and keep handling events.
    Continue,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no token provided")]
    MissingToken,

    #[error("no app token provided (socket mode needs an xapp- token)")]
    MissingAppToken,
}

/// The bot's user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity(String);

impl BotIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// The literal Slack renders for a mention of this user.
    pub fn mention_marker(&self) -> String {
        format!("<@{}>", self.0)
    }
}

/// Validated, immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub app_token: String,
    pub identity: BotIdentity,
    pub command: CommandSpec,
    pub timeout: Option<Duration>,
    pub on_error: FailurePolicy,
    pub api_base: String,
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if args.app_token.trim().is_empty() {
            return Err(ConfigError::MissingAppToken);
        }

        Ok(Self {
            token: args.token,
            app_token: args.app_token,
            identity: BotIdentity::new(args.bot_id),
            command: CommandSpec::parse(&args.cmd),
            timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
            on_error: args.on_error,
            api_base: args.api_base,
        })
    }
}
