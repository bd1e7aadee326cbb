use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame is missing its command line")]
    MissingCommand,
    #[error("Unknown frame command {0}")]
    UnknownCommand(String),
    #[error("Malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("Invalid escape sequence in header {0:?}")]
    InvalidEscape(String),
    #[error("Invalid content-length {0:?}")]
    InvalidContentLength(String),
    #[error("Frame body is not NUL terminated")]
    Unterminated,
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not connected to the broker")]
    NotConnected,
    #[error("No authentication token available")]
    MissingToken,
    #[error("Token store error: {0}")]
    TokenStore(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Broker error: {message}")]
    Broker {
        message: String,
        details: Option<String>,
    },
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Timed out waiting for CONNECTED")]
    HandshakeTimeout,
    #[error("Connection closed during handshake")]
    HandshakeClosed,
    #[error("No heart-beat from the broker within {0:?}")]
    HeartbeatTimeout(std::time::Duration),
}
