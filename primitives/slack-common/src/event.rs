//! Inbound events and the source they are pulled from.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Event kind string for chat messages.
pub const MESSAGE_KIND: &str = "message";

/// A message posted in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    pub text: String,
}

/// An event delivered by the real-time connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    /// Any other event kind; never acted upon.
    Other { kind: String },
}

impl InboundEvent {
    pub fn message(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message(MessageEvent {
            channel: channel.into(),
            text: text.into(),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Message(_) => MESSAGE_KIND,
            Self::Other { kind } => kind,
        }
    }

    /// Converts a Slack Events API `event` object.
    ///
    /// Message events without a `text` or `channel` string (edits, deletions)
    /// map to empty strings; they can never contain a mention.
    pub fn from_slack(event: &Value) -> Self {
        let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();

        if kind != MESSAGE_KIND {
            return Self::Other {
                kind: kind.to_string(),
            };
        }

        let field = |name: &str| {
            event
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self::Message(MessageEvent {
            channel: field("channel"),
            text: field("text"),
        })
    }
}

/// A lazy, non-restartable sequence of inbound events.
///
/// `None` means the source is exhausted and will produce nothing more.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<InboundEvent>;
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<InboundEvent> {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        self.recv().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_message_event() {
        let event = json!({
            "type": "message",
            "channel": "C024BE91L",
            "user": "U2147483697",
            "text": "hey <@U123> run it",
            "ts": "1355517523.000005"
        });

        assert_eq!(
            InboundEvent::from_slack(&event),
            InboundEvent::message("C024BE91L", "hey <@U123> run it")
        );
    }

    #[test]
    fn message_without_text_has_empty_text() {
        let event = json!({
            "type": "message",
            "subtype": "message_deleted",
            "channel": "C1",
            "deleted_ts": "1358878749.000002"
        });

        let converted = InboundEvent::from_slack(&event);
        assert_eq!(converted.kind(), "message");
        assert_eq!(converted, InboundEvent::message("C1", ""));
    }

    #[test]
    fn other_kinds_keep_their_name() {
        let event = json!({
            "type": "channel_created",
            "channel": { "id": "C2", "name": "fun" }
        });

        let converted = InboundEvent::from_slack(&event);
        assert_eq!(converted.kind(), "channel_created");
        assert!(matches!(converted, InboundEvent::Other { .. }));
    }

    #[tokio::test]
    async fn receiver_drains_in_order_then_ends() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(InboundEvent::message("C1", "first")).unwrap();
        tx.send(InboundEvent::Other {
            kind: "user_typing".into(),
        })
        .unwrap();
        drop(tx);

        assert_eq!(
            rx.next_event().await,
            Some(InboundEvent::message("C1", "first"))
        );
        assert_eq!(rx.next_event().await.unwrap().kind(), "user_typing");
        assert_eq!(rx.next_event().await, None);
    }
}
