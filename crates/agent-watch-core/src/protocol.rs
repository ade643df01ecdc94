//! Wire protocol between session owners and observing clients.

use serde::{Deserialize, Serialize};

use crate::model::{AgentState, ProjectId, SessionId, Snapshot, TaskDiff, ToolLogEntry};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join (or rejoin) a session and request its snapshot.
    JoinSession {
        project_id: ProjectId,
        session_id: SessionId,
    },
    /// Ask the session owner to cooperatively stop the running agent.
    InterruptSession { session_id: SessionId },
    /// Stop observing a session.
    LeaveSession { session_id: SessionId },
}

impl ClientMessage {
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        match self {
            Self::JoinSession { session_id, .. }
            | Self::InterruptSession { session_id }
            | Self::LeaveSession { session_id } => session_id,
        }
    }
}

/// Message from server to client. Every message names its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Join response carrying the full snapshot.
    SessionJoined {
        session_id: SessionId,
        snapshot: Snapshot,
    },
    /// Join response for a missing or invalid session.
    JoinError { session_id: SessionId, reason: String },
    AgentStateUpdate {
        session_id: SessionId,
        agent_state: AgentState,
    },
    ToolLogAppend {
        session_id: SessionId,
        log_entry: ToolLogEntry,
    },
    TaskDiffUpdate { session_id: SessionId, diff: TaskDiff },
    CostUpdate {
        session_id: SessionId,
        #[serde(rename = "totalUSD")]
        total_usd: f64,
    },
    TokenCount {
        session_id: SessionId,
        current: u64,
        max: u64,
    },
    InterruptAcknowledged { session_id: SessionId },
    InterruptComplete { session_id: SessionId },
    InterruptError { session_id: SessionId, message: String },
    /// The session owner emptied the tool log.
    SessionCleared { session_id: SessionId },
    ServerError {
        session_id: SessionId,
        message: String,
        #[serde(default)]
        critical: bool,
    },
}

/// Live update scoped to one session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    AgentStateUpdate(AgentState),
    ToolLogAppend(ToolLogEntry),
    TaskDiffUpdate(TaskDiff),
    CostUpdate { total_usd: f64 },
    TokenCount { current: u64, max: u64 },
    InterruptAcknowledged,
    InterruptComplete,
    InterruptError { message: String },
    SessionCleared,
    ServerError { message: String, critical: bool },
}

impl SessionEvent {
    /// Event name as used on the wire, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AgentStateUpdate(_) => "agent_state_update",
            Self::ToolLogAppend(_) => "tool_log_append",
            Self::TaskDiffUpdate(_) => "task_diff_update",
            Self::CostUpdate { .. } => "cost_update",
            Self::TokenCount { .. } => "token_count",
            Self::InterruptAcknowledged => "interrupt_acknowledged",
            Self::InterruptComplete => "interrupt_complete",
            Self::InterruptError { .. } => "interrupt_error",
            Self::SessionCleared => "session_cleared",
            Self::ServerError { .. } => "server_error",
        }
    }
}

/// A server message split by role: join response or session event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Joined {
        session_id: SessionId,
        snapshot: Snapshot,
    },
    JoinFailed {
        session_id: SessionId,
        reason: String,
    },
    Event {
        session_id: SessionId,
        event: SessionEvent,
    },
}

impl ServerMessage {
    /// Wrap a session event for the wire.
    #[must_use]
    pub fn event(session_id: SessionId, event: SessionEvent) -> Self {
        match event {
            SessionEvent::AgentStateUpdate(agent_state) => Self::AgentStateUpdate {
                session_id,
                agent_state,
            },
            SessionEvent::ToolLogAppend(log_entry) => Self::ToolLogAppend {
                session_id,
                log_entry,
            },
            SessionEvent::TaskDiffUpdate(diff) => Self::TaskDiffUpdate { session_id, diff },
            SessionEvent::CostUpdate { total_usd } => Self::CostUpdate {
                session_id,
                total_usd,
            },
            SessionEvent::TokenCount { current, max } => Self::TokenCount {
                session_id,
                current,
                max,
            },
            SessionEvent::InterruptAcknowledged => Self::InterruptAcknowledged { session_id },
            SessionEvent::InterruptComplete => Self::InterruptComplete { session_id },
            SessionEvent::InterruptError { message } => Self::InterruptError { session_id, message },
            SessionEvent::SessionCleared => Self::SessionCleared { session_id },
            SessionEvent::ServerError { message, critical } => Self::ServerError {
                session_id,
                message,
                critical,
            },
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        match self {
            Self::SessionJoined { session_id, .. }
            | Self::JoinError { session_id, .. }
            | Self::AgentStateUpdate { session_id, .. }
            | Self::ToolLogAppend { session_id, .. }
            | Self::TaskDiffUpdate { session_id, .. }
            | Self::CostUpdate { session_id, .. }
            | Self::TokenCount { session_id, .. }
            | Self::InterruptAcknowledged { session_id }
            | Self::InterruptComplete { session_id }
            | Self::InterruptError { session_id, .. }
            | Self::SessionCleared { session_id }
            | Self::ServerError { session_id, .. } => session_id,
        }
    }

    /// Split into a join response or a session-scoped event.
    #[must_use]
    pub fn into_inbound(self) -> Inbound {
        let (session_id, event) = match self {
            Self::SessionJoined {
                session_id,
                snapshot,
            } => return Inbound::Joined {
                session_id,
                snapshot,
            },
            Self::JoinError { session_id, reason } => {
                return Inbound::JoinFailed { session_id, reason };
            }
            Self::AgentStateUpdate {
                session_id,
                agent_state,
            } => (session_id, SessionEvent::AgentStateUpdate(agent_state)),
            Self::ToolLogAppend {
                session_id,
                log_entry,
            } => (session_id, SessionEvent::ToolLogAppend(log_entry)),
            Self::TaskDiffUpdate { session_id, diff } => (session_id, SessionEvent::TaskDiffUpdate(diff)),
            Self::CostUpdate {
                session_id,
                total_usd,
            } => (session_id, SessionEvent::CostUpdate { total_usd }),
            Self::TokenCount {
                session_id,
                current,
                max,
            } => (session_id, SessionEvent::TokenCount { current, max }),
            Self::InterruptAcknowledged { session_id } => (session_id, SessionEvent::InterruptAcknowledged),
            Self::InterruptComplete { session_id } => (session_id, SessionEvent::InterruptComplete),
            Self::InterruptError { session_id, message } => {
                (session_id, SessionEvent::InterruptError { message })
            }
            Self::SessionCleared { session_id } => (session_id, SessionEvent::SessionCleared),
            Self::ServerError {
                session_id,
                message,
                critical,
            } => (session_id, SessionEvent::ServerError { message, critical }),
        };
        Inbound::Event { session_id, event }
    }
}

/// Connection lifecycle reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Connected,
    Disconnected { reason: String },
    ConnectError { error: String },
}
