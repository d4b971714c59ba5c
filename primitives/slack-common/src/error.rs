/// Errors talking to Slack.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack API returned status {0}")]
    Status(reqwest::StatusCode),

    /// `ok: false` in a Web API response body.
    #[error("Slack API error: {0}")]
    Api(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}
