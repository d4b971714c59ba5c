//! Mention Bot
//!
//! Connects to Slack over Socket Mode, and whenever a message mentions the
//! bot, runs the configured command and posts its stdout to that channel.
//!
//! # Usage
//!
//! ```bash
//! # Reply with `echo foo bar cat` output when <@U8HV269AT> is mentioned
//! mention-bot --token xoxb-... --app-token xapp-...
//!
//! # Custom bot id and command, kill the command after 30 seconds
//! mention-bot -t xoxb-... -a xapp-... --bot-id U123 --cmd "uptime -p" --timeout-secs 30
//!
//! # Log failures instead of exiting
//! mention-bot -t xoxb-... -a xapp-... --on-error continue
//! ```

use anyhow::Context;
use clap::Parser;
use exec_common::ProcessExecutor;
use mention_bot::{Args, Config, Dispatcher};
use slack_common::{SlackWebClient, SocketModeClient};
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("mention_bot=info,slack_common=info,exec_common=info")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::try_from(Args::parse())?;

    // Runs for the life of the process and reconnects on its own.
    let (mut events, _connection) =
        SocketModeClient::with_api_base(&config.app_token, &config.api_base).spawn();

    let dispatcher = Dispatcher::from_config(
        &config,
        ProcessExecutor::new(config.timeout),
        SlackWebClient::with_api_base(&config.token, &config.api_base),
    );

    tracing::info!(
        bot_id = config.identity.id(),
        command = %config.command,
        "mention-bot ready, ^C exits"
    );

    // Set up SIGTERM handler for graceful shutdown
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = dispatcher.run(&mut events) => {
            result.context("mention handling aborted")?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, exiting");
        }

        _ = sigterm.recv() => {
            tracing::info!("terminated, exiting");
        }
    }

    Ok(())
}
