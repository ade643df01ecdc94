//! Session data model shared by session owners and observers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier received from the session owner.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Identifier of an observed agent session.
    SessionId
);
opaque_id!(
    /// Identifier of the project a session belongs to.
    ProjectId
);
opaque_id!(
    /// Identifier of one tool call, shared by its Start and End entries.
    ToolCallId
);
opaque_id!(
    /// Identifier of a task, unique within a session.
    TaskId
);

impl SessionId {
    /// Generate a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Coarse agent status as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    ToolRunning,
}

/// What the agent is doing right now.
///
/// The running tool call only exists in the `ToolRunning` variant, so an
/// active tool without that status cannot be represented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Activity {
    #[default]
    Idle,
    Thinking,
    ToolRunning { tool_call_id: ToolCallId },
}

/// Last broadcast agent state. Always replaced whole, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AgentStateWire", into = "AgentStateWire")]
pub struct AgentState {
    pub activity: Activity,
    pub status_text: Option<String>,
    pub start_time: Option<Millis>,
}

impl AgentState {
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn thinking(status_text: impl Into<String>, start_time: Millis) -> Self {
        Self {
            activity: Activity::Thinking,
            status_text: Some(status_text.into()),
            start_time: Some(start_time),
        }
    }

    #[must_use]
    pub fn tool_running(tool_call_id: impl Into<ToolCallId>, start_time: Option<Millis>) -> Self {
        Self {
            activity: Activity::ToolRunning {
                tool_call_id: tool_call_id.into(),
            },
            status_text: None,
            start_time,
        }
    }

    #[must_use]
    pub const fn status(&self) -> AgentStatus {
        match self.activity {
            Activity::Idle => AgentStatus::Idle,
            Activity::Thinking => AgentStatus::Thinking,
            Activity::ToolRunning { .. } => AgentStatus::ToolRunning,
        }
    }

    #[must_use]
    pub const fn active_tool_call_id(&self) -> Option<&ToolCallId> {
        match &self.activity {
            Activity::ToolRunning { tool_call_id } => Some(tool_call_id),
            Activity::Idle | Activity::Thinking => None,
        }
    }

    /// Whether `tool_call_id` is the tool currently running.
    #[must_use]
    pub fn is_running(&self, tool_call_id: &ToolCallId) -> bool {
        self.active_tool_call_id() == Some(tool_call_id)
    }
}

/// Rejected agent state: the active tool id disagrees with the status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAgentState {
    #[error("status tool_running requires activeToolCallId")]
    MissingActiveTool,
    #[error("activeToolCallId {0} set while status is {1:?}")]
    UnexpectedActiveTool(ToolCallId, AgentStatus),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentStateWire {
    status: AgentStatus,
    #[serde(default)]
    status_text: Option<String>,
    #[serde(default)]
    start_time: Option<Millis>,
    #[serde(default)]
    active_tool_call_id: Option<ToolCallId>,
}

impl TryFrom<AgentStateWire> for AgentState {
    type Error = InvalidAgentState;

    fn try_from(wire: AgentStateWire) -> Result<Self, Self::Error> {
        let activity = match (wire.status, wire.active_tool_call_id) {
            (AgentStatus::ToolRunning, Some(tool_call_id)) => Activity::ToolRunning { tool_call_id },
            (AgentStatus::ToolRunning, None) => return Err(InvalidAgentState::MissingActiveTool),
            (status, Some(id)) => return Err(InvalidAgentState::UnexpectedActiveTool(id, status)),
            (AgentStatus::Idle, None) => Activity::Idle,
            (AgentStatus::Thinking, None) => Activity::Thinking,
        };
        Ok(Self {
            activity,
            status_text: wire.status_text,
            start_time: wire.start_time,
        })
    }
}

impl From<AgentState> for AgentStateWire {
    fn from(state: AgentState) -> Self {
        let status = state.status();
        let active_tool_call_id = match state.activity {
            Activity::ToolRunning { tool_call_id } => Some(tool_call_id),
            Activity::Idle | Activity::Thinking => None,
        };
        Self {
            status,
            status_text: state.status_text,
            start_time: state.start_time,
            active_tool_call_id,
        }
    }
}

/// Which side of a tool call an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolLogKind {
    Start,
    End,
}

/// One append-only tool log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolLogEntry {
    pub kind: ToolLogKind,
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub timestamp: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptive_text: Option<String>,
}

impl ToolLogEntry {
    #[must_use]
    pub fn start(tool_call_id: impl Into<ToolCallId>, tool_name: impl Into<String>, timestamp: Millis) -> Self {
        Self::new(ToolLogKind::Start, tool_call_id.into(), tool_name.into(), timestamp)
    }

    #[must_use]
    pub fn end(tool_call_id: impl Into<ToolCallId>, tool_name: impl Into<String>, timestamp: Millis) -> Self {
        Self::new(ToolLogKind::End, tool_call_id.into(), tool_name.into(), timestamp)
    }

    const fn new(kind: ToolLogKind, tool_call_id: ToolCallId, tool_name: String, timestamp: Millis) -> Self {
        Self {
            kind,
            tool_call_id,
            tool_name,
            timestamp,
            args: None,
            result: None,
            descriptive_text: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn with_descriptive_text(mut self, text: impl Into<String>) -> Self {
        self.descriptive_text = Some(text.into());
        self
    }

    /// Whether an End entry's result reports a failed tool call.
    ///
    /// Recognises `isError`/`is_error: true`, `success: false` and a
    /// non-null `error` field.
    #[must_use]
    pub fn indicates_failure(&self) -> bool {
        let Some(Value::Object(result)) = &self.result else {
            return false;
        };
        let flag = |key: &str| result.get(key).and_then(Value::as_bool);
        flag("isError") == Some(true)
            || flag("is_error") == Some(true)
            || flag("success") == Some(false)
            || result.get("error").is_some_and(|e| !e.is_null())
    }
}

/// Task progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    #[serde(alias = "completed")]
    Done,
    Cancelled,
}

/// Entry of the session's ordered task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub status: TaskStatus,
}

impl Task {
    #[must_use]
    pub fn new(id: impl Into<TaskId>, text: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            status,
        }
    }
}

/// Incremental structural change to the task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TaskDiff {
    Add {
        task: Task,
    },
    Remove {
        task_id: TaskId,
    },
    Update {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<TaskStatus>,
    },
}

/// Accumulated spend of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    #[serde(rename = "totalUSD")]
    pub total_usd: f64,
}

/// Context-window token usage. Display only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub current: u64,
    pub max: u64,
}

impl TokenInfo {
    /// Used share of the window in `0.0..=1.0`, zero when `max` is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            (self.current as f64 / self.max as f64).min(1.0)
        }
    }
}

/// Full point-in-time session state returned on join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub agent_state: AgentState,
    #[serde(default)]
    pub tool_log_entries: Vec<ToolLogEntry>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub cost: CostInfo,
    #[serde(default)]
    pub token_info: TokenInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_state_wire_shape() {
        let state = AgentState::tool_running("t1", Some(1000));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "tool_running");
        assert_eq!(json["activeToolCallId"], "t1");
        assert_eq!(json["startTime"], 1000);

        let parsed: AgentState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_agent_state_rejects_inconsistent_tool() {
        let missing = json!({ "status": "tool_running" });
        assert!(serde_json::from_value::<AgentState>(missing).is_err());

        let stray = json!({ "status": "thinking", "activeToolCallId": "t9" });
        assert!(serde_json::from_value::<AgentState>(stray).is_err());
    }

    #[test]
    fn test_agent_state_rejects_unknown_status() {
        let unknown = json!({ "status": "sleeping" });
        assert!(serde_json::from_value::<AgentState>(unknown).is_err());
    }

    #[test]
    fn test_failure_detection() {
        let ok = ToolLogEntry::end("t1", "Bash", 10).with_result(json!({ "output": "hi" }));
        assert!(!ok.indicates_failure());

        let flagged = ToolLogEntry::end("t1", "Bash", 10).with_result(json!({ "isError": true }));
        assert!(flagged.indicates_failure());

        let unsuccessful = ToolLogEntry::end("t1", "Bash", 10).with_result(json!({ "success": false }));
        assert!(unsuccessful.indicates_failure());

        let errored = ToolLogEntry::end("t1", "Bash", 10).with_result(json!({ "error": "boom" }));
        assert!(errored.indicates_failure());

        let null_error = ToolLogEntry::end("t1", "Bash", 10).with_result(json!({ "error": null }));
        assert!(!null_error.indicates_failure());
    }

    #[test]
    fn test_task_diff_wire_shape() {
        let diff: TaskDiff = serde_json::from_value(json!({
            "op": "update",
            "taskId": "A",
            "status": "completed"
        }))
        .unwrap();
        assert_eq!(
            diff,
            TaskDiff::Update {
                task_id: TaskId::from("A"),
                text: None,
                status: Some(TaskStatus::Done),
            }
        );
    }

    #[test]
    fn test_snapshot_defaults() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "agentState": { "status": "idle" }
        }))
        .unwrap();
        assert!(snapshot.tool_log_entries.is_empty());
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.cost.total_usd.abs() < f64::EPSILON);
    }

    #[test]
    fn test_token_fraction() {
        assert!((TokenInfo { current: 50, max: 200 }.fraction() - 0.25).abs() < f64::EPSILON);
        assert!(TokenInfo { current: 5, max: 0 }.fraction().abs() < f64::EPSILON);
        assert!((TokenInfo { current: 300, max: 200 }.fraction() - 1.0).abs() < f64::EPSILON);
    }
}
