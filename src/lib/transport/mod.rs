//! WebSocket plumbing beneath the STOMP session.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Uri};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::core::{ClientError, Frame, FrameError};

pub type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// STOMP versions offered as WebSocket sub-protocols.
pub const SUBPROTOCOLS: &str = "v12.stomp, v11.stomp, v10.stomp";

pub async fn open(url: &str) -> Result<WsConnection, ClientError> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOLS));
    let (ws_stream, _) = connect_async(request).await?;
    Ok(ws_stream)
}

/// Value for the STOMP `host` header: the endpoint authority, or `localhost`
/// when the URL has none.
pub fn host_of(url: &str) -> String {
    url.parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Frames travel as text messages unless the body is not UTF-8.
pub fn to_message(frame: &Frame) -> WsMessage {
    match String::from_utf8(frame.encode()) {
        Ok(text) => WsMessage::Text(text),
        Err(e) => WsMessage::Binary(e.into_bytes()),
    }
}

pub fn heartbeat() -> WsMessage {
    WsMessage::Text("\n".to_string())
}

/// STOMP frames carried by a data message; `None` for control messages.
pub fn decode(msg: &WsMessage) -> Result<Option<Vec<Frame>>, FrameError> {
    match msg {
        WsMessage::Text(text) => Frame::parse_all(text.as_bytes()).map(Some),
        WsMessage::Binary(data) => Frame::parse_all(data).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Command;

    #[test]
    fn host_header_from_url() {
        assert_eq!(host_of("wss://api.example.com:443/ws"), "api.example.com");
        assert_eq!(host_of("not a url"), "localhost");
    }

    #[test]
    fn heartbeat_decodes_to_no_frames() {
        assert_eq!(decode(&heartbeat()).unwrap(), Some(vec![]));
        assert_eq!(decode(&WsMessage::Ping(vec![])).unwrap(), None);
    }

    #[test]
    fn frames_go_out_as_text() {
        let msg = to_message(&Frame::new(Command::Disconnect).header("receipt", "r-1"));
        assert_eq!(msg, WsMessage::Text("DISCONNECT\nreceipt:r-1\n\n\0".to_string()));
    }
}
