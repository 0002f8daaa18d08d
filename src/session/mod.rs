//! Stream sessions
//!
//! [`StreamSession`] is the server side of one connection,
//! [`ClientSession`] the receiving side. Both are generic over the transport
//! and codec traits so they run the same over WebSocket and in memory.

pub mod client;
pub mod registry;
pub mod stream;

pub use client::{ClientOptions, ClientReport, ClientSession, ClientState, SessionEnd};
pub use registry::{SessionRegistry, SessionStatus, SessionTracker};
pub use stream::{StreamOptions, StreamReport, StreamSession, StreamState};
