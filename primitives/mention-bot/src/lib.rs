//! Mention Bot - Run a Command When Mentioned
//!
//! Watches a Slack workspace for messages containing `<@bot-id>`, runs the
//! configured command, and posts its stdout back to the channel the mention
//! came from.

pub mod config;
pub mod dispatcher;

pub use config::{Args, BotIdentity, Config, ConfigError, FailurePolicy};
pub use dispatcher::{DispatchError, Dispatcher, Outcome};
