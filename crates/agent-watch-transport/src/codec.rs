//! JSON text frames for the session protocol.

use agent_watch_core::{ClientMessage, ServerMessage};
use serde::{Serialize, de::DeserializeOwned};

/// Frame encoding or decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Binary frame is not UTF-8")]
    NotUtf8,
}

fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(frame).map_err(ProtocolError::Decode)
}

/// Encode a server message as a text frame.
///
/// # Errors
/// Returns error if the message cannot be serialized.
pub fn encode_server(message: &ServerMessage) -> Result<String, ProtocolError> {
    encode(message)
}

/// Encode a client message as a text frame.
///
/// # Errors
/// Returns error if the message cannot be serialized.
pub fn encode_client(message: &ClientMessage) -> Result<String, ProtocolError> {
    encode(message)
}

/// Decode a server text frame.
///
/// # Errors
/// Returns error for malformed JSON, unknown message types and agent states
/// that break the running-tool invariant.
pub fn decode_server(frame: &str) -> Result<ServerMessage, ProtocolError> {
    decode(frame)
}

/// Decode a client text frame.
///
/// # Errors
/// Returns error for malformed JSON or unknown message types.
pub fn decode_client(frame: &str) -> Result<ClientMessage, ProtocolError> {
    decode(frame)
}

/// Decode a client frame sent as bytes.
///
/// # Errors
/// Returns error if the bytes are not UTF-8 or not a valid message.
pub fn decode_client_bytes(frame: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::NotUtf8)?;
    decode_client(text)
}
