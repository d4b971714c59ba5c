//! Slack Common - Slack Transport for the Mention Bot
//!
//! Two capabilities, each behind a trait so the dispatcher can be driven by
//! fakes in tests:
//!
//! - [`EventSource`]: inbound events, delivered in arrival order. The Slack
//!   implementation is a Socket Mode connection manager ([`SocketModeClient`])
//!   feeding an unbounded channel.
//! - [`MessageSink`]: outbound posts. The Slack implementation is the Web API
//!   `chat.postMessage` call ([`SlackWebClient`]).

mod error;
pub mod event;
pub mod socket_mode;
pub mod web;

pub use error::SlackError;
pub use event::{EventSource, InboundEvent, MessageEvent};
pub use socket_mode::SocketModeClient;
pub use web::{Attachment, MessageSink, OutboundResponse, SlackWebClient};

/// Default Slack Web API base URL.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";
