//! Real-time user events over WebSocket
//!
//! The relay fans every published frame out to all open connections; the
//! client half connects to it and reads those frames back.

mod client;
mod events;
mod server;

pub use client::RelayConnection;
pub use events::{Channel, EventKind, RelayFrame, UserEvent, UserPayload};
pub use server::{relay_router, ConnectionId, RelayHub, RelaySubscriber};
