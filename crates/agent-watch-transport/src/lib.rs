//! Transport layer for agent session observers.
//!
//! Provides:
//! - JSON frame codec
//! - Tokio timer scheduler and the single-task session driver
//! - In-process channel transport and the per-connection relay
//! - WebSocket endpoint (feature: websocket)
//! - Terminal renderer (feature: tui)

pub mod channel;
pub mod codec;
pub mod driver;
pub mod relay;
pub mod scheduler;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use channel::{ChannelOutbound, InProcessConnection, Incoming};
pub use codec::ProtocolError;
pub use driver::{DriverHandle, SessionDriver, ViewCommand};
pub use relay::Relay;
pub use scheduler::TokioScheduler;
