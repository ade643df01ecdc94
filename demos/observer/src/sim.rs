//! Scripted session owner pushing a plausible agent run into a feed.

use std::{sync::Arc, time::Duration};

use agent_watch_core::{
    AgentState, Clock, SessionEvent, SessionFeed, SystemClock, Task, TaskDiff, TaskStatus, ToolLogEntry,
};
use serde_json::json;
use tokio::time::sleep;
use tracing::info;

struct Step {
    tool: &'static str,
    args: serde_json::Value,
    runs_for: Duration,
    fails: bool,
}

fn script() -> Vec<Step> {
    vec![
        Step {
            tool: "Read",
            args: json!({ "file_path": "src/lib.rs" }),
            runs_for: Duration::from_millis(400),
            fails: false,
        },
        Step {
            tool: "Grep",
            args: json!({ "pattern": "fn apply" }),
            runs_for: Duration::from_millis(600),
            fails: false,
        },
        Step {
            tool: "Bash",
            args: json!({ "command": "cargo test --workspace", "description": "Run the test suite" }),
            runs_for: Duration::from_millis(2_500),
            fails: true,
        },
        Step {
            tool: "Edit",
            args: json!({ "file_path": "src/view.rs" }),
            runs_for: Duration::from_millis(800),
            fails: false,
        },
    ]
}

/// Run the script in a loop until the feed's owner is interrupted, then
/// acknowledge and complete the interrupt and start over.
pub async fn run(feed: Arc<SessionFeed>) {
    let clock = SystemClock;
    feed.push(SessionEvent::TaskDiffUpdate(TaskDiff::Add {
        task: Task::new("inspect", "Inspect the projector", TaskStatus::InProgress),
    }));
    feed.push(SessionEvent::TaskDiffUpdate(TaskDiff::Add {
        task: Task::new("fix", "Fix the failing test", TaskStatus::Pending),
    }));

    let mut cost = 0.0;
    let mut call = 0_u32;
    loop {
        for step in script() {
            call += 1;
            let tool_call_id = format!("call-{call}");

            feed.push_agent_state(AgentState::thinking("Planning next step", clock.now_ms()));
            if interrupted_during(&feed, Duration::from_millis(300)).await {
                break;
            }

            let started = clock.now_ms();
            feed.push_tool_entry(ToolLogEntry::start(tool_call_id.as_str(), step.tool, started).with_args(step.args));
            feed.push_agent_state(AgentState::tool_running(tool_call_id.as_str(), Some(started)));
            let stopped = interrupted_during(&feed, step.runs_for).await;

            let result = if step.fails {
                json!({ "isError": true, "output": "1 test failed" })
            } else {
                json!({ "output": "ok" })
            };
            feed.push_tool_entry(ToolLogEntry::end(tool_call_id.as_str(), step.tool, clock.now_ms()).with_result(result));

            cost += 0.0125;
            feed.push_cost(cost);
            feed.push_tokens(u64::from(call) * 1_800, 200_000);
            if stopped {
                break;
            }
        }

        feed.push(SessionEvent::TaskDiffUpdate(TaskDiff::Update {
            task_id: "inspect".into(),
            text: None,
            status: Some(TaskStatus::Done),
        }));
        feed.push_agent_state(AgentState::idle());
        sleep(Duration::from_secs(1)).await;
    }
}

// Sleep for `duration`; on an interrupt request, run the handshake and
// return true.
async fn interrupted_during(feed: &SessionFeed, duration: Duration) -> bool {
    tokio::select! {
        () = sleep(duration) => false,
        () = feed.interrupted() => {
            info!(session_id = %feed.session_id(), "interrupt received, stopping agent");
            feed.push(SessionEvent::InterruptAcknowledged);
            sleep(Duration::from_millis(250)).await;
            feed.push_agent_state(AgentState::idle());
            feed.push(SessionEvent::InterruptComplete);
            true
        }
    }
}
