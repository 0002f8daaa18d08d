//! In-process transport backed by a tokio channel
//!
//! Behaves like a WebSocket connection: an explicit close arrives as a clean
//! end of stream, a dropped peer as `ConnectionClosed`.

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::network::{EncodedFrame, FrameSink, FrameStream};

/// `None` marks a clean close
type Item = Option<EncodedFrame>;

/// Create a connected sink/stream pair holding up to `capacity` frames in flight
pub fn pair(capacity: usize) -> (MemorySink, MemoryStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MemorySink { tx: Some(tx) }, MemoryStream { rx })
}

pub struct MemorySink {
    tx: Option<mpsc::Sender<Item>>,
}

impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: EncodedFrame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(Some(frame))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn closed(&mut self) {
        if let Some(tx) = &self.tx {
            tx.closed().await;
        }
    }

    async fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(None).await;
        }
    }
}

pub struct MemoryStream {
    rx: mpsc::Receiver<Item>,
}

impl FrameStream for MemoryStream {
    async fn recv_frame(&mut self) -> Result<Option<EncodedFrame>, TransportError> {
        match self.rx.recv().await {
            Some(Some(frame)) => Ok(Some(frame)),
            Some(None) => Ok(None),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
