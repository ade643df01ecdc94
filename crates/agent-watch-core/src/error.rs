//! Error types surfaced to renderers and callers.

use std::time::Duration;

use thiserror::Error;

use crate::model::SessionId;

/// Outbound transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Encode error: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

/// Errors reported by the session view.
///
/// All of them are terminal at this layer: nothing is retried, they are
/// shown to the user who decides how to recover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },
    #[error("Connection failed: {error}")]
    ConnectFailed { error: String },
    #[error("Could not join session {session_id}: {reason}")]
    Join { session_id: SessionId, reason: String },
    #[error("Server error: {message}")]
    Server { message: String, critical: bool },
    #[error("Interrupt failed: {0}")]
    Interrupt(String),
    #[error("Interrupt not confirmed within {0:?}")]
    InterruptTimedOut(Duration),
    #[error("An interrupt is already pending")]
    InterruptPending,
    #[error("Not joined to a session")]
    NotJoined,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ViewError {
    /// Errors that keep input disabled until resolved externally.
    #[must_use]
    pub const fn disables_input(&self) -> bool {
        matches!(self, Self::Join { .. } | Self::Server { critical: true, .. })
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
