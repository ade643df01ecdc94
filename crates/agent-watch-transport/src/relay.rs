//! Per-connection relay between a client and a [`SessionSource`].
//!
//! The relay answers joins with the snapshot, then forwards the session's
//! live events tagged with its id. An observer that falls behind the
//! broadcast buffer is resynchronised with a fresh `session_joined`, which
//! the view treats as a hard reset.

use std::sync::Arc;

use agent_watch_core::{
    ClientMessage, ProjectId, ServerMessage, SessionEvent, SessionId, SessionSource,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

type Out = mpsc::UnboundedSender<ServerMessage>;

pub struct Relay {
    source: Arc<dyn SessionSource>,
    out: Out,
    forwarder: Option<(SessionId, JoinHandle<()>)>,
}

impl Relay {
    #[must_use]
    pub fn new(source: Arc<dyn SessionSource>, out: Out) -> Self {
        Self {
            source,
            out,
            forwarder: None,
        }
    }

    /// Handle one client message.
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::JoinSession {
                project_id,
                session_id,
            } => self.join(project_id, session_id).await,
            ClientMessage::InterruptSession { session_id } => self.interrupt(session_id).await,
            ClientMessage::LeaveSession { session_id } => self.leave(&session_id),
        }
    }

    /// Session currently forwarded, if any.
    #[must_use]
    pub fn joined(&self) -> Option<&SessionId> {
        self.forwarder.as_ref().map(|(id, _)| id)
    }

    /// Stop forwarding.
    pub fn shutdown(&mut self) {
        if let Some((session_id, handle)) = self.forwarder.take() {
            debug!(%session_id, "stopping forwarder");
            handle.abort();
        }
    }

    async fn join(&mut self, project_id: ProjectId, session_id: SessionId) {
        self.shutdown();
        match self.source.join(&project_id, &session_id).await {
            Ok((snapshot, events)) => {
                info!(%project_id, %session_id, "observer joined");
                if self
                    .out
                    .send(ServerMessage::SessionJoined {
                        session_id: session_id.clone(),
                        snapshot,
                    })
                    .is_err()
                {
                    return;
                }
                let handle = tokio::spawn(forward(
                    Arc::clone(&self.source),
                    project_id,
                    session_id.clone(),
                    events,
                    self.out.clone(),
                ));
                self.forwarder = Some((session_id, handle));
            }
            Err(e) => {
                warn!(%project_id, %session_id, error = %e, "join rejected");
                let _ = self.out.send(ServerMessage::JoinError {
                    session_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn interrupt(&mut self, session_id: SessionId) {
        if let Err(e) = self.source.interrupt(&session_id).await {
            warn!(%session_id, error = %e, "interrupt could not be delivered");
            let _ = self.out.send(ServerMessage::event(
                session_id,
                SessionEvent::InterruptError {
                    message: e.to_string(),
                },
            ));
        }
    }

    fn leave(&mut self, session_id: &SessionId) {
        if self.joined() == Some(session_id) {
            info!(%session_id, "observer left");
            self.shutdown();
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn forward(
    source: Arc<dyn SessionSource>,
    project_id: ProjectId,
    session_id: SessionId,
    mut events: broadcast::Receiver<SessionEvent>,
    out: Out,
) {
    loop {
        let message = match events.recv().await {
            Ok(event) => ServerMessage::event(session_id.clone(), event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%session_id, skipped, "observer lagged, sending a fresh snapshot");
                match source.join(&project_id, &session_id).await {
                    Ok((snapshot, fresh)) => {
                        events = fresh;
                        ServerMessage::SessionJoined {
                            session_id: session_id.clone(),
                            snapshot,
                        }
                    }
                    Err(e) => ServerMessage::event(
                        session_id.clone(),
                        SessionEvent::ServerError {
                            message: e.to_string(),
                            critical: true,
                        },
                    ),
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!(%session_id, "session feed closed");
                return;
            }
        };
        if out.send(message).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agent_watch_core::{AgentState, JoinError, SessionHub, Snapshot, ToolLogEntry};
    use async_trait::async_trait;

    use super::*;

    fn hub_with_session() -> Arc<SessionHub> {
        let hub = Arc::new(SessionHub::new());
        hub.insert(ProjectId::from("p1"), SessionId::from("s1"), Snapshot::default());
        hub
    }

    fn join(session: &str) -> ClientMessage {
        ClientMessage::JoinSession {
            project_id: "p1".into(),
            session_id: session.into(),
        }
    }

    #[tokio::test]
    async fn test_join_then_forward_events() {
        let hub = hub_with_session();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = Relay::new(hub.clone(), tx);

        relay.handle(join("s1")).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::SessionJoined { .. })));

        let feed = hub.get(&SessionId::from("s1")).unwrap();
        feed.push_tool_entry(ToolLogEntry::start("t1", "Bash", 10));
        let Some(ServerMessage::ToolLogAppend { session_id, log_entry }) = rx.recv().await else {
            panic!("expected a forwarded entry");
        };
        assert_eq!(session_id, SessionId::from("s1"));
        assert_eq!(log_entry.tool_call_id.as_str(), "t1");
    }

    #[tokio::test]
    async fn test_unknown_session_gets_join_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = Relay::new(hub_with_session(), tx);

        relay.handle(join("nope")).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::JoinError { .. })));
        assert!(relay.joined().is_none());
    }

    #[tokio::test]
    async fn test_leave_stops_forwarding() {
        let hub = hub_with_session();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = Relay::new(hub.clone(), tx);
        relay.handle(join("s1")).await;
        let _ = rx.recv().await;

        relay
            .handle(ClientMessage::LeaveSession { session_id: "s1".into() })
            .await;
        assert!(relay.joined().is_none());

        hub.get(&SessionId::from("s1"))
            .unwrap()
            .push_agent_state(AgentState::thinking("x", 1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_interrupt_reaches_owner() {
        let hub = hub_with_session();
        let feed = hub.get(&SessionId::from("s1")).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut relay = Relay::new(hub, tx);

        let waiter = tokio::spawn(async move { feed.interrupted().await });
        relay
            .handle(ClientMessage::InterruptSession { session_id: "s1".into() })
            .await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    struct Unreachable;

    #[async_trait]
    impl SessionSource for Unreachable {
        async fn join(
            &self,
            _project_id: &ProjectId,
            session_id: &SessionId,
        ) -> Result<(Snapshot, broadcast::Receiver<SessionEvent>), JoinError> {
            Err(JoinError::NotFound(session_id.clone()))
        }

        async fn interrupt(&self, session_id: &SessionId) -> Result<(), JoinError> {
            Err(JoinError::NotFound(session_id.clone()))
        }
    }

    #[tokio::test]
    async fn test_failed_interrupt_is_reported_as_interrupt_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = Relay::new(Arc::new(Unreachable), tx);
        relay
            .handle(ClientMessage::InterruptSession { session_id: "s1".into() })
            .await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::InterruptError { .. })));
    }
}
