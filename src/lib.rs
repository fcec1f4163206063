//! Usercast - live user-registration status
//!
//! A WebSocket relay that fans user events out to every viewer, a client-side
//! reconciler that folds those events into a local list, and a proxy for the
//! user directory API.

pub mod app;
pub mod config;
pub mod directory;
pub mod error;
pub mod form;
pub mod proxy;
pub mod realtime;
pub mod reconciler;
pub mod status;
pub mod types;

pub use error::{Result, UsercastError};
pub use reconciler::Reconciler;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
