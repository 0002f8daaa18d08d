//! Network subsystem for WebSocket frame transport
//!
//! Sessions only see [`FrameSink`] (server side) and [`FrameStream`] (client
//! side). Each transport message carries exactly one encoded frame.

pub mod client;
pub mod handlers;
pub mod memory;
pub mod server;

use std::future::Future;

pub use crate::codec::EncodedFrame;
use crate::error::TransportError;

pub use client::{connect, WsFrameStream};
pub use memory::{pair, MemorySink, MemoryStream};
pub use server::{StreamServer, WsFrameSink};

/// Sending half of a frame transport
pub trait FrameSink: Send {
    /// Send one frame as one message
    ///
    /// A peer that has gone away is reported as
    /// [`TransportError::ConnectionClosed`].
    fn send_frame(
        &mut self,
        frame: EncodedFrame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolves once the peer has closed the connection
    fn closed(&mut self) -> impl Future<Output = ()> + Send;

    /// Close the transport; errors are ignored
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Receiving half of a frame transport
pub trait FrameStream: Send {
    /// Next frame, `Ok(None)` on a clean close
    ///
    /// An abnormal close surfaces as [`TransportError::ConnectionClosed`].
    fn recv_frame(
        &mut self,
    ) -> impl Future<Output = Result<Option<EncodedFrame>, TransportError>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
