//! Derived display values handed to renderers.

use std::fmt;

use crate::model::ToolCallId;

/// Lifecycle phase of a tool widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetPhase {
    /// Started, not the active tool, not finished (e.g. replayed history).
    Pending,
    /// The agent is currently running this tool.
    Active,
    Completed,
    /// Completed with a failed result.
    Errored,
}

impl WidgetPhase {
    /// Completed and Errored never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// Icon family for a tool, picked from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolIcon {
    Shell,
    Read,
    Write,
    Search,
    Web,
    Agent,
    Todo,
    Generic,
}

impl ToolIcon {
    #[must_use]
    pub fn for_tool(tool_name: &str) -> Self {
        let name = tool_name.to_ascii_lowercase();
        match name.as_str() {
            "bash" | "shell" | "terminal" | "exec" | "run_command" => Self::Shell,
            "read" | "view" | "cat" | "read_file" | "notebookread" => Self::Read,
            "write" | "edit" | "multiedit" | "write_file" | "edit_file" | "notebookedit" => Self::Write,
            "grep" | "glob" | "search" | "find" | "ls" | "list_files" => Self::Search,
            "webfetch" | "websearch" | "fetch" | "web_search" | "browser" => Self::Web,
            "task" | "agent" | "subagent" => Self::Agent,
            "todowrite" | "todoread" | "todo" => Self::Todo,
            _ if name.starts_with("mcp__") => Self::Web,
            _ => Self::Generic,
        }
    }

    #[must_use]
    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Shell => "$",
            Self::Read => "▤",
            Self::Write => "✎",
            Self::Search => "⌕",
            Self::Web => "◎",
            Self::Agent => "◆",
            Self::Todo => "☐",
            Self::Generic => "•",
        }
    }
}

/// What a renderer shows for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolWidgetView {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub phase: WidgetPhase,
    pub elapsed_ms: u64,
    pub icon: ToolIcon,
    pub label: Option<String>,
}

impl ToolWidgetView {
    /// Elapsed time as shown next to the widget, e.g. `1.5s`.
    #[must_use]
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_ms)
    }
}

#[must_use]
pub fn format_elapsed(ms: u64) -> String {
    if ms < 60_000 {
        format!("{}.{}s", ms / 1000, (ms % 1000) / 100)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

/// Cost value to display. `animate` asks the renderer to tween from
/// `previous_usd`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostDisplay {
    pub total_usd: f64,
    pub previous_usd: Option<f64>,
    pub animate: bool,
}

impl fmt::Display for CostDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total_usd.abs() < 1.0 {
            write!(f, "${:.4}", self.total_usd)
        } else {
            write!(f, "${:.2}", self.total_usd)
        }
    }
}

/// Interrupt request progress as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptStatus {
    #[default]
    Idle,
    Requested,
    Acknowledged,
}

/// Transport health as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connected,
    Disconnected { reason: String },
    Failed { error: String },
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}
