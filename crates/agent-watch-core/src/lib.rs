//! Core building blocks for observing agent sessions.
//!
//! This crate provides:
//! - `model` - Session data model (agent state, tool log, tasks, cost)
//! - `protocol` - Wire messages between session owners and observers
//! - `clock` - Time source and cancellable timer scheduling
//! - `tasks` - Ordered task list with structural diffs
//! - `feed` - Session owner side: fold + broadcast for joins
//! - Renderer, outbound and session source traits

pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod protocol;
pub mod tasks;
pub mod traits;
pub mod view_model;

pub use clock::{Clock, ManualClock, ManualScheduler, Scheduler, SystemClock, TimerId, TimerSchedule};
pub use config::ViewConfig;
pub use error::{ConfigError, TransportError, ViewError};
pub use feed::{SessionFeed, SessionHub};
pub use model::{
    Activity, AgentState, AgentStatus, CostInfo, Millis, ProjectId, SessionId, Snapshot, Task, TaskDiff, TaskId,
    TaskStatus, TokenInfo, ToolCallId, ToolLogEntry, ToolLogKind,
};
pub use protocol::{ClientMessage, Inbound, ServerMessage, SessionEvent, TransportSignal};
pub use tasks::{DiffOutcome, TaskList};
pub use traits::{JoinError, Outbound, Renderer, SessionSource};
pub use view_model::{ConnectionStatus, CostDisplay, InterruptStatus, ToolIcon, ToolWidgetView, WidgetPhase};
