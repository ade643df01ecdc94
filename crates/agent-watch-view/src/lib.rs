//! Client-side projection of a live agent session.
//!
//! This crate provides:
//! - `projector` - Pure mapping from tool log entries to widget views
//! - `tasks` re-export - Ordered task list with structural diffs
//! - `interrupt` - Interrupt handshake with a local timeout
//! - `cost` - Running cost and token tally
//! - `view` - The orchestrator tying them to a renderer and a transport
//!
//! All inputs of a [`ClientSessionView`] are handled one at a time by its
//! owner, so no state in this crate is shared across threads.

pub mod context;
pub mod cost;
pub mod interrupt;
pub mod projector;
pub mod view;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent_watch_core::{DiffOutcome, TaskList};
pub use context::{JoinTarget, SessionViewContext};
pub use cost::CostAccumulator;
pub use interrupt::{InterruptCoordinator, InterruptOutcome};
pub use projector::{EntryRejected, ToolCallEntries, label, project};
pub use view::ClientSessionView;
