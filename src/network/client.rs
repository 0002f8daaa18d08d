//! WebSocket client side of the frame transport

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::network::{EncodedFrame, FrameStream};

/// Open a WebSocket connection to `url`
pub async fn connect(url: &str) -> Result<WsFrameStream, TransportError> {
    let (inner, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectionFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!("Connected to {}", url);
    Ok(WsFrameStream { inner })
}

/// Client side of a WebSocket connection
pub struct WsFrameStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FrameStream for WsFrameStream {
    async fn recv_frame(&mut self) -> Result<Option<EncodedFrame>, TransportError> {
        loop {
            let received = match self.inner.next().await {
                Some(received) => received,
                // Stream ended without a close handshake
                None => return Err(TransportError::ConnectionClosed),
            };

            let message = received.map_err(classify_error)?;
            if let Some(outcome) = classify_message(message) {
                return outcome;
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        let _ = self.inner.close(Some(frame)).await;
    }
}

/// Map one incoming message to a receive outcome; `None` means skip it
fn classify_message(message: Message) -> Option<Result<Option<EncodedFrame>, TransportError>> {
    match message {
        Message::Binary(data) => Some(Ok(Some(Bytes::from(data)))),
        Message::Text(_) => Some(Err(TransportError::Protocol(
            "unexpected text message".to_string(),
        ))),
        Message::Close(None) => Some(Ok(None)),
        Message::Close(Some(frame)) => match frame.code {
            CloseCode::Normal | CloseCode::Away => {
                if !frame.reason.is_empty() {
                    tracing::info!("Server closed the stream: {}", frame.reason);
                }
                Some(Ok(None))
            }
            code => {
                tracing::warn!("Server closed with code {}: {}", u16::from(code), frame.reason);
                Some(Err(TransportError::ConnectionClosed))
            }
        },
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

fn classify_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_)
        | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::ConnectionClosed
        }
        other => TransportError::ReceiveFailed(other.to_string()),
    }
}
