//! In-process transport between a view and a session source.

use std::sync::Arc;

use agent_watch_core::{ClientMessage, Outbound, ServerMessage, SessionSource, TransportError, TransportSignal};
use tokio::sync::mpsc;
use tracing::debug;

use crate::relay::Relay;

/// Input delivered to a driver by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(ServerMessage),
    Signal(TransportSignal),
}

impl From<ServerMessage> for Incoming {
    fn from(message: ServerMessage) -> Self {
        Self::Message(message)
    }
}

impl From<TransportSignal> for Incoming {
    fn from(signal: TransportSignal) -> Self {
        Self::Signal(signal)
    }
}

/// Client side [`Outbound`] over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelOutbound {
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { tx }
    }
}

impl Outbound for ChannelOutbound {
    fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::ChannelClosed)
    }
}

/// A client wired to a [`Relay`] inside the same process.
///
/// The relay runs until `outbound` is dropped; the pump feeding `incoming`
/// stops with it and queues a final `Disconnected` signal.
pub struct InProcessConnection {
    pub outbound: ChannelOutbound,
    pub incoming: mpsc::UnboundedReceiver<Incoming>,
}

impl InProcessConnection {
    /// Connect to `source`. A `Connected` signal is queued first.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn connect(source: Arc<dyn SessionSource>) -> Self {
        let (client_tx, mut client_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (server_tx, mut server_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel::<Incoming>();

        let _ = incoming_tx.send(Incoming::Signal(TransportSignal::Connected));

        tokio::spawn(async move {
            let mut relay = Relay::new(source, server_tx);
            while let Some(message) = client_rx.recv().await {
                relay.handle(message).await;
            }
            relay.shutdown();
            debug!("in-process relay stopped");
        });

        tokio::spawn(async move {
            while let Some(message) = server_rx.recv().await {
                if incoming_tx.send(Incoming::Message(message)).is_err() {
                    return;
                }
            }
            let _ = incoming_tx.send(Incoming::Signal(TransportSignal::Disconnected {
                reason: "relay closed".into(),
            }));
        });

        Self {
            outbound: ChannelOutbound::new(client_tx),
            incoming,
        }
    }
}

#[cfg(test)]
mod tests {
    use agent_watch_core::{ProjectId, SessionHub, SessionId, Snapshot};

    use super::*;

    #[tokio::test]
    async fn test_connect_then_join() {
        let hub = Arc::new(SessionHub::new());
        hub.insert(ProjectId::from("p1"), SessionId::from("s1"), Snapshot::default());

        let mut connection = InProcessConnection::connect(hub);
        assert_eq!(
            connection.incoming.recv().await,
            Some(Incoming::Signal(TransportSignal::Connected))
        );

        tokio_test::assert_ok!(connection.outbound.send(ClientMessage::JoinSession {
            project_id: "p1".into(),
            session_id: "s1".into(),
        }));
        let Some(Incoming::Message(ServerMessage::SessionJoined { session_id, .. })) = connection.incoming.recv().await
        else {
            panic!("expected a join response");
        };
        assert_eq!(session_id, SessionId::from("s1"));
    }

    #[test]
    fn test_closed_outbound_reports_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut outbound = ChannelOutbound::new(tx);
        let err = outbound.send(ClientMessage::LeaveSession { session_id: "s1".into() });
        assert_eq!(err, Err(TransportError::ChannelClosed));
    }
}
