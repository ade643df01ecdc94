//! Capability traits at the edges of the session view.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    error::{TransportError, ViewError},
    model::{AgentState, ProjectId, SessionId, Snapshot, Task, TaskId, TokenInfo, ToolCallId},
    protocol::{ClientMessage, SessionEvent},
    view_model::{ConnectionStatus, CostDisplay, InterruptStatus, ToolWidgetView},
};

/// Display surface driven by the session view.
///
/// The view only calls a method when the corresponding value changed.
pub trait Renderer {
    /// A tool call appeared.
    fn show_widget(&mut self, widget: &ToolWidgetView);

    /// Phase, elapsed time or label of a shown widget changed.
    fn update_widget(&mut self, widget: &ToolWidgetView);

    /// A widget went away (leave, rejoin or session clear).
    fn remove_widget(&mut self, tool_call_id: &ToolCallId);

    fn agent_state(&mut self, state: &AgentState);

    fn tasks(&mut self, tasks: &[Task], selected: Option<&TaskId>);

    fn cost(&mut self, cost: &CostDisplay);

    fn tokens(&mut self, tokens: &TokenInfo);

    fn interrupt(&mut self, status: InterruptStatus);

    fn input_enabled(&mut self, enabled: bool);

    fn connection(&mut self, status: &ConnectionStatus);

    fn error(&mut self, error: &ViewError);

    /// Called before a join snapshot is applied.
    fn reset(&mut self) {}
}

/// Outbound half of the transport.
pub trait Outbound {
    /// Queue a message for the server.
    ///
    /// # Errors
    /// Returns error if the transport is gone.
    fn send(&mut self, message: ClientMessage) -> Result<(), TransportError>;
}

/// Join failure reported by a session owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session {0} does not belong to project {1}")]
    WrongProject(SessionId, ProjectId),
}

/// Server-side answer to joins: snapshot plus the live stream after it.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Snapshot and a receiver positioned right after it.
    async fn join(
        &self,
        project_id: &ProjectId,
        session_id: &SessionId,
    ) -> Result<(Snapshot, broadcast::Receiver<SessionEvent>), JoinError>;

    /// Forward an interrupt request to the session owner.
    async fn interrupt(&self, session_id: &SessionId) -> Result<(), JoinError>;
}
