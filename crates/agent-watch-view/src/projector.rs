//! Tool log projection.
//!
//! [`project`] maps the entries of one tool call and the current agent
//! state to the widget a renderer shows. It is a pure function: the same
//! inputs always give the same view, so widgets can be recomputed at any
//! time (on join replay, on agent state change, on every tick).

use agent_watch_core::{
    AgentState, Millis, ToolCallId, ToolIcon, ToolLogEntry, ToolLogKind, ToolWidgetView, WidgetPhase,
};
use serde_json::Value;
use thiserror::Error;

const LABEL_MAX_CHARS: usize = 80;

/// Argument keys used to summarise a call, in order of preference.
const LABEL_ARG_KEYS: &[&str] = &[
    "description",
    "command",
    "file_path",
    "path",
    "pattern",
    "url",
    "query",
    "prompt",
];

/// Why an entry was not recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryRejected {
    #[error("Duplicate {kind:?} entry for tool call {tool_call_id}")]
    Duplicate {
        tool_call_id: ToolCallId,
        kind: ToolLogKind,
    },
    #[error("Entry for {got} recorded under {expected}")]
    WrongCall { expected: ToolCallId, got: ToolCallId },
}

/// The Start and End entries of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallEntries {
    tool_call_id: ToolCallId,
    start: Option<ToolLogEntry>,
    end: Option<ToolLogEntry>,
}

impl ToolCallEntries {
    #[must_use]
    pub const fn new(tool_call_id: ToolCallId) -> Self {
        Self {
            tool_call_id,
            start: None,
            end: None,
        }
    }

    /// Collect `entries` for `tool_call_id`, skipping other calls and
    /// duplicates.
    #[must_use]
    pub fn collect<'a>(tool_call_id: &ToolCallId, entries: impl IntoIterator<Item = &'a ToolLogEntry>) -> Self {
        let mut call = Self::new(tool_call_id.clone());
        for entry in entries {
            if &entry.tool_call_id == tool_call_id {
                let _ = call.record(entry.clone());
            }
        }
        call
    }

    /// Record an entry. At most one Start and one End are kept.
    ///
    /// # Errors
    /// Returns error for a second entry of the same kind or an entry of a
    /// different tool call.
    pub fn record(&mut self, entry: ToolLogEntry) -> Result<(), EntryRejected> {
        if entry.tool_call_id != self.tool_call_id {
            return Err(EntryRejected::WrongCall {
                expected: self.tool_call_id.clone(),
                got: entry.tool_call_id,
            });
        }
        let slot = match entry.kind {
            ToolLogKind::Start => &mut self.start,
            ToolLogKind::End => &mut self.end,
        };
        if slot.is_some() {
            return Err(EntryRejected::Duplicate {
                tool_call_id: entry.tool_call_id,
                kind: entry.kind,
            });
        }
        *slot = Some(entry);
        Ok(())
    }

    #[must_use]
    pub const fn tool_call_id(&self) -> &ToolCallId {
        &self.tool_call_id
    }

    #[must_use]
    pub const fn start(&self) -> Option<&ToolLogEntry> {
        self.start.as_ref()
    }

    #[must_use]
    pub const fn end(&self) -> Option<&ToolLogEntry> {
        self.end.as_ref()
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    #[must_use]
    pub fn tool_name(&self) -> &str {
        self.start
            .as_ref()
            .or(self.end.as_ref())
            .map_or("", |e| e.tool_name.as_str())
    }
}

/// Derive the widget of one tool call.
///
/// - `Completed` (or `Errored` on a failed result) once an End entry
///   exists; the agent state is ignored from then on.
/// - `Active` while the agent reports this call as the running tool.
///   Elapsed time counts from the agent's start time, falling back to the
///   Start entry.
/// - `Pending` otherwise.
///
/// `now` only feeds the elapsed time of non-terminal widgets.
#[must_use]
pub fn project(
    tool_call_id: &ToolCallId,
    entries: &ToolCallEntries,
    agent_state: &AgentState,
    now: Millis,
) -> ToolWidgetView {
    let started_at = entries.start().map(|e| e.timestamp);

    let (phase, elapsed) = if let Some(end) = entries.end() {
        let phase = if end.indicates_failure() {
            WidgetPhase::Errored
        } else {
            WidgetPhase::Completed
        };
        (phase, started_at.map_or(0, |start| end.timestamp.saturating_sub(start)))
    } else if agent_state.is_running(tool_call_id) {
        let since = agent_state.start_time.or(started_at);
        (WidgetPhase::Active, since.map_or(0, |since| now.saturating_sub(since)))
    } else {
        (WidgetPhase::Pending, started_at.map_or(0, |start| now.saturating_sub(start)))
    };

    let tool_name = entries.tool_name().to_owned();
    ToolWidgetView {
        tool_call_id: tool_call_id.clone(),
        icon: ToolIcon::for_tool(&tool_name),
        tool_name,
        phase,
        elapsed_ms: u64::try_from(elapsed).unwrap_or(0),
        label: label(entries),
    }
}

/// Short one-line description of a call.
///
/// Prefers the End entry's descriptive text, then the Start entry's, then a
/// summary of the arguments.
#[must_use]
pub fn label(entries: &ToolCallEntries) -> Option<String> {
    let descriptive = [entries.end(), entries.start()]
        .into_iter()
        .flatten()
        .find_map(|e| e.descriptive_text.as_deref())
        .filter(|text| !text.trim().is_empty());

    let raw = match descriptive {
        Some(text) => text.to_owned(),
        None => entries.start().and_then(|e| e.args.as_ref()).and_then(summarize_args)?,
    };
    Some(truncate(&single_line(&raw), LABEL_MAX_CHARS))
}

fn summarize_args(args: &Value) -> Option<String> {
    match args {
        Value::Object(map) => LABEL_ARG_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id(s: &str) -> ToolCallId {
        ToolCallId::from(s)
    }

    fn started(name: &str, ts: Millis) -> ToolCallEntries {
        ToolCallEntries::collect(&id("t1"), &[ToolLogEntry::start("t1", name, ts)])
    }

    #[test]
    fn test_projection_is_idempotent() {
        let entries = started("Bash", 1000);
        let agent = AgentState::tool_running("t1", Some(1000));

        let first = project(&id("t1"), &entries, &agent, 1_250);
        let second = project(&id("t1"), &entries, &agent, 1_250);
        assert_eq!(first, second);
        assert_eq!(first.phase, WidgetPhase::Active);
        assert_eq!(first.elapsed_ms, 250);
    }

    #[test]
    fn test_end_entry_is_terminal_despite_active_agent() {
        let mut entries = started("Bash", 1000);
        entries.record(ToolLogEntry::end("t1", "Bash", 1500)).unwrap();
        // Stale agent state still claims t1 is running.
        let agent = AgentState::tool_running("t1", Some(1000));

        let view = project(&id("t1"), &entries, &agent, 9_999);
        assert_eq!(view.phase, WidgetPhase::Completed);
        assert_eq!(view.elapsed_ms, 500);
    }

    #[test]
    fn test_failed_result_is_errored() {
        let mut entries = started("Bash", 1000);
        entries
            .record(ToolLogEntry::end("t1", "Bash", 1200).with_result(json!({ "isError": true })))
            .unwrap();

        let view = project(&id("t1"), &entries, &AgentState::idle(), 2_000);
        assert_eq!(view.phase, WidgetPhase::Errored);
        assert!(view.phase.is_terminal());
        assert_eq!(view.elapsed_ms, 200);
    }

    #[test]
    fn test_active_prefers_agent_start_time() {
        let entries = started("Read", 1000);
        let agent = AgentState::tool_running("t1", Some(1100));
        assert_eq!(project(&id("t1"), &entries, &agent, 1_600).elapsed_ms, 500);

        let no_start = AgentState::tool_running("t1", None);
        assert_eq!(project(&id("t1"), &entries, &no_start, 1_600).elapsed_ms, 600);
    }

    #[test]
    fn test_other_active_tool_leaves_pending() {
        let entries = started("Grep", 1000);
        let agent = AgentState::tool_running("t2", Some(1500));

        let view = project(&id("t1"), &entries, &agent, 1_700);
        assert_eq!(view.phase, WidgetPhase::Pending);
        assert_eq!(view.elapsed_ms, 700);
        assert_eq!(view.icon, ToolIcon::Search);
    }

    #[test]
    fn test_end_before_start_clamps_to_zero() {
        let mut entries = started("Bash", 2000);
        entries.record(ToolLogEntry::end("t1", "Bash", 1500)).unwrap();
        assert_eq!(project(&id("t1"), &entries, &AgentState::idle(), 0).elapsed_ms, 0);
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let mut entries = started("Bash", -5);
        entries.record(ToolLogEntry::end("t1", "Bash", Millis::MAX)).unwrap();
        let done = project(&id("t1"), &entries, &AgentState::idle(), 0);
        assert_eq!(done.elapsed_ms, u64::try_from(Millis::MAX).unwrap());

        let open = started("Bash", Millis::MAX);
        let pending = project(&id("t1"), &open, &AgentState::idle(), Millis::MIN);
        assert_eq!(pending.elapsed_ms, 0);

        let running = AgentState::tool_running("t1", Some(Millis::MIN));
        let active = project(&id("t1"), &open, &running, Millis::MAX);
        assert_eq!(active.phase, WidgetPhase::Active);
        assert_eq!(active.elapsed_ms, u64::try_from(Millis::MAX).unwrap());
    }

    #[test]
    fn test_duplicates_and_foreign_entries_rejected() {
        let mut entries = started("Bash", 1000);
        let dup = entries.record(ToolLogEntry::start("t1", "Bash", 1001));
        assert!(matches!(dup, Err(EntryRejected::Duplicate { kind: ToolLogKind::Start, .. })));

        let foreign = entries.record(ToolLogEntry::end("t2", "Bash", 1001));
        assert!(matches!(foreign, Err(EntryRejected::WrongCall { .. })));
        assert_eq!(entries.start().unwrap().timestamp, 1000);
    }

    #[test]
    fn test_end_only_call_is_completed() {
        let entries = ToolCallEntries::collect(&id("t1"), &[ToolLogEntry::end("t1", "Write", 1500)]);
        let view = project(&id("t1"), &entries, &AgentState::idle(), 3_000);
        assert_eq!(view.phase, WidgetPhase::Completed);
        assert_eq!(view.elapsed_ms, 0);
        assert_eq!(view.tool_name, "Write");
    }

    #[test]
    fn test_label_prefers_descriptive_text() {
        let mut entries = ToolCallEntries::collect(
            &id("t1"),
            &[ToolLogEntry::start("t1", "Bash", 1)
                .with_args(json!({ "command": "cargo build" }))
                .with_descriptive_text("Building")],
        );
        assert_eq!(label(&entries).as_deref(), Some("Building"));

        entries
            .record(ToolLogEntry::end("t1", "Bash", 2).with_descriptive_text("Built"))
            .unwrap();
        assert_eq!(label(&entries).as_deref(), Some("Built"));
    }

    #[test]
    fn test_label_from_args() {
        let entries = ToolCallEntries::collect(
            &id("t1"),
            &[ToolLogEntry::start("t1", "Bash", 1).with_args(json!({ "command": "ls\n  -la" }))],
        );
        assert_eq!(label(&entries).as_deref(), Some("ls -la"));

        let none = ToolCallEntries::collect(&id("t1"), &[ToolLogEntry::start("t1", "Bash", 1)]);
        assert_eq!(label(&none), None);
    }

    #[test]
    fn test_label_truncated() {
        let long = "x".repeat(200);
        let entries = ToolCallEntries::collect(
            &id("t1"),
            &[ToolLogEntry::start("t1", "Read", 1).with_args(json!({ "file_path": long }))],
        );
        let label = label(&entries).unwrap();
        assert_eq!(label.chars().count(), LABEL_MAX_CHARS);
        assert!(label.ends_with('…'));
    }
}
