//! Socket Mode - Real-Time Event Connection
//!
//! Opens a WebSocket with `apps.connections.open`, acknowledges every
//! envelope, and forwards the events it carries into an unbounded channel.
//! The connection manager runs as its own task and reconnects whenever Slack
//! asks it to or the socket drops.
//!
//! # Envelopes
//!
//! - `hello` - connection is ready
//! - `events_api` - carries an Events API `event`; acknowledged, then forwarded
//! - `disconnect` - Slack is about to close the socket; reconnect
//!
//! Anything else with an `envelope_id` is acknowledged and dropped.

use crate::{InboundEvent, SlackError};
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;

/// Delay before reconnecting after a session ends.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Delay before retrying a failed `apps.connections.open`.
const OPEN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Response of `apps.connections.open`.
#[derive(Debug, Deserialize)]
struct OpenResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

/// Raw Socket Mode envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    payload: Option<Value>,
    reason: Option<String>,
}

/// A decoded WebSocket frame.
#[derive(Debug, PartialEq)]
enum Frame {
    Hello,
    Event {
        envelope_id: Option<String>,
        event: Option<InboundEvent>,
    },
    Disconnect {
        reason: String,
    },
    Other {
        kind: String,
        envelope_id: Option<String>,
    },
}

impl Frame {
    fn parse(text: &str) -> Result<Self, SlackError> {
        let envelope: Envelope = serde_json::from_str(text)?;

        Ok(match envelope.kind.as_str() {
            "hello" => Self::Hello,
            "events_api" => Self::Event {
                envelope_id: envelope.envelope_id,
                event: envelope
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("event"))
                    .map(InboundEvent::from_slack),
            },
            "disconnect" => Self::Disconnect {
                reason: envelope.reason.unwrap_or_default(),
            },
            _ => Self::Other {
                kind: envelope.kind,
                envelope_id: envelope.envelope_id,
            },
        })
    }
}

/// Builds the acknowledgement Slack expects for an envelope.
fn ack(envelope_id: &str) -> Message {
    Message::Text(json!({ "envelope_id": envelope_id }).to_string())
}

/// How a single WebSocket session ended.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// Socket closed or Slack requested a reconnect.
    Reconnect,
    /// Nobody is reading events anymore.
    ReceiverGone,
}

/// Socket Mode client authenticated with an app-level token.
#[derive(Debug, Clone)]
pub struct SocketModeClient {
    client: Client,
    app_token: String,
    api_base: String,
}

impl SocketModeClient {
    pub fn with_api_base(app_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            app_token: app_token.into(),
            api_base: api_base.into(),
        }
    }

    /// Starts the connection manager.
    ///
    /// Events arrive on the returned receiver in the order Slack delivered
    /// them. The task exits once the receiver is dropped.
    pub fn spawn(self) -> (mpsc::UnboundedReceiver<InboundEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.manage_connection(tx));
        (rx, handle)
    }

    /// Requests a fresh WebSocket URL.
    async fn open_connection(&self) -> Result<String, SlackError> {
        let url = format!(
            "{}/apps.connections.open",
            self.api_base.trim_end_matches('/')
        );

        let reply = self
            .client
            .post(url)
            .bearer_auth(&self.app_token)
            .send()
            .await?;

        if !reply.status().is_success() {
            return Err(SlackError::Status(reply.status()));
        }

        let body: OpenResponse = reply.json().await?;
        match (body.ok, body.url) {
            (true, Some(url)) => Ok(url),
            _ => Err(SlackError::Api(
                body.error.unwrap_or_else(|| "no socket url".to_string()),
            )),
        }
    }

    async fn manage_connection(self, tx: mpsc::UnboundedSender<InboundEvent>) {
        while !tx.is_closed() {
            let url = match self.open_connection().await {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open socket mode connection");
                    tokio::time::sleep(OPEN_RETRY_DELAY).await;
                    continue;
                }
            };

            match run_session(&url, &tx).await {
                Ok(SessionEnd::ReceiverGone) => break,
                Ok(SessionEnd::Reconnect) => tracing::info!("socket mode session ended, reconnecting"),
                Err(e) => tracing::warn!(error = %e, "socket mode session failed, reconnecting"),
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }

        tracing::debug!("event receiver dropped, connection manager exiting");
    }
}

/// Reads one WebSocket session to completion.
async fn run_session(
    url: &str,
    tx: &mpsc::UnboundedSender<InboundEvent>,
) -> Result<SessionEnd, SlackError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await?;

    while let Some(message) = ws.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(SessionEnd::Reconnect),
            _ => continue,
        };

        let frame = match Frame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable frame");
                continue;
            }
        };

        match frame {
            Frame::Hello => tracing::info!("socket mode connected"),

            Frame::Event { envelope_id, event } => {
                // Slack redelivers anything not acknowledged within a few seconds.
                if let Some(ref id) = envelope_id {
                    ws.send(ack(id)).await?;
                }

                if let Some(event) = event {
                    tracing::trace!(kind = event.kind(), ?envelope_id, "received event");
                    if tx.send(event).is_err() {
                        let _ = ws.close(None).await;
                        return Ok(SessionEnd::ReceiverGone);
                    }
                }
            }

            Frame::Disconnect { reason } => {
                tracing::info!(%reason, "slack requested disconnect");
                let _ = ws.close(None).await;
                return Ok(SessionEnd::Reconnect);
            }

            Frame::Other { kind, envelope_id } => {
                tracing::debug!(%kind, "ignoring envelope");
                if let Some(ref id) = envelope_id {
                    ws.send(ack(id)).await?;
                }
            }
        }
    }

    Ok(SessionEnd::Reconnect)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use tokio::net::TcpListener;

    #[test]
    fn parses_hello() {
        let frame = Frame::parse(r#"{"type":"hello","num_connections":1}"#).unwrap();
        assert_eq!(frame, Frame::Hello);
    }

    #[test]
    fn parses_events_api_envelope() {
        let text = json!({
            "type": "events_api",
            "envelope_id": "57d6a792-4d35-4d0b-b6aa-3361493e1caf",
            "payload": {
                "type": "event_callback",
                "event": { "type": "message", "channel": "C1", "text": "<@U123> go" }
            },
            "accepts_response_payload": false
        })
        .to_string();

        assert_eq!(
            Frame::parse(&text).unwrap(),
            Frame::Event {
                envelope_id: Some("57d6a792-4d35-4d0b-b6aa-3361493e1caf".into()),
                event: Some(InboundEvent::message("C1", "<@U123> go")),
            }
        );
    }

    #[test]
    fn parses_disconnect() {
        let frame = Frame::parse(r#"{"type":"disconnect","reason":"refresh_requested"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Disconnect {
                reason: "refresh_requested".into()
            }
        );
    }

    #[test]
    fn other_envelopes_keep_their_id() {
        let frame =
            Frame::parse(r#"{"type":"slash_commands","envelope_id":"e1","payload":{}}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Other {
                kind: "slash_commands".into(),
                envelope_id: Some("e1".into())
            }
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(Frame::parse("not json"), Err(SlackError::Json(_))));
    }

    #[test]
    fn ack_echoes_envelope_id() {
        let Message::Text(text) = ack("abc") else {
            panic!("ack must be a text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "envelope_id": "abc" }));
    }

    fn message_envelope(envelope_id: &str, channel: &str, text: &str) -> Message {
        let envelope = json!({
            "type": "events_api",
            "envelope_id": envelope_id,
            "payload": {
                "event": { "type": "message", "channel": channel, "text": text }
            }
        });
        Message::Text(envelope.to_string())
    }

    /// Serves `apps.connections.open`, always handing out `ws_url`.
    async fn serve_connections_open(ws_url: String) -> String {
        let app = Router::new().route(
            "/apps.connections.open",
            post(move || {
                let url = ws_url.clone();
                async move { Json(json!({ "ok": true, "url": url })) }
            }),
        );
        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_base = format!("http://{}", http_listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(http_listener, app).await;
        });
        api_base
    }

    /// Binds a local WebSocket listener and returns it with its URL.
    async fn ws_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    async fn accept_session(listener: &TcpListener) -> ServerSocket {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"type":"hello"}"#.to_string()))
            .await
            .unwrap();
        ws
    }

    /// Waits for the next text frame and decodes it.
    async fn next_json(ws: &mut ServerSocket) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn forwards_events_and_acknowledges_envelopes() {
        let (listener, ws_url) = ws_listener().await;
        let (ack_tx, mut acks) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut ws = accept_session(&listener).await;
            ws.send(message_envelope("env-1", "C7", "hi <@U123>"))
                .await
                .unwrap();
            let _ = ack_tx.send(next_json(&mut ws).await);
            while let Some(Ok(_)) = ws.next().await {}
        });

        let api_base = serve_connections_open(ws_url).await;
        let (mut events, handle) = SocketModeClient::with_api_base("xapp-1", api_base).spawn();

        assert_eq!(
            events.recv().await.unwrap(),
            InboundEvent::message("C7", "hi <@U123>")
        );
        assert_eq!(acks.recv().await.unwrap(), json!({ "envelope_id": "env-1" }));

        drop(events);
        handle.abort();
    }

    #[tokio::test]
    async fn reconnects_after_disconnect_and_dropped_socket() {
        let (listener, ws_url) = ws_listener().await;

        tokio::spawn(async move {
            // Slack asks for a reconnect.
            let mut ws = accept_session(&listener).await;
            ws.send(message_envelope("env-0", "C0", "x")).await.unwrap();
            next_json(&mut ws).await;
            ws.send(Message::Text(
                r#"{"type":"disconnect","reason":"refresh_requested"}"#.to_string(),
            ))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}

            // The socket goes away without a close handshake.
            let mut ws = accept_session(&listener).await;
            ws.send(message_envelope("env-1", "C1", "x")).await.unwrap();
            next_json(&mut ws).await;
            drop(ws);

            let mut ws = accept_session(&listener).await;
            ws.send(message_envelope("env-2", "C2", "x")).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let api_base = serve_connections_open(ws_url).await;
        let (mut events, handle) = SocketModeClient::with_api_base("xapp-1", api_base).spawn();

        let mut received = Vec::new();
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(event);
        }

        assert_eq!(
            received,
            vec![
                InboundEvent::message("C0", "x"),
                InboundEvent::message("C1", "x"),
                InboundEvent::message("C2", "x"),
            ]
        );

        drop(events);
        handle.abort();
    }

    #[tokio::test]
    async fn manager_exits_once_receiver_is_dropped() {
        let (listener, ws_url) = ws_listener().await;
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut ws = accept_session(&listener).await;
            ws.send(message_envelope("env-1", "C1", "first")).await.unwrap();
            next_json(&mut ws).await;

            let _ = release_rx.await;
            ws.send(message_envelope("env-2", "C1", "second")).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let api_base = serve_connections_open(ws_url).await;
        let (mut events, handle) = SocketModeClient::with_api_base("xapp-1", api_base).spawn();

        assert_eq!(
            events.recv().await.unwrap(),
            InboundEvent::message("C1", "first")
        );

        drop(events);
        release_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn open_connection_reports_api_error() {
        let app = Router::new().route(
            "/apps.connections.open",
            post(|| async { Json(json!({ "ok": false, "error": "invalid_auth" })) }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let err = SocketModeClient::with_api_base("xapp-bad", api_base)
            .open_connection()
            .await
            .unwrap_err();
        assert!(matches!(err, SlackError::Api(ref e) if e == "invalid_auth"));
    }
}
