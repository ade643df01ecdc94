//! Session owner side of the protocol: one writer, many observers.
//!
//! A [`SessionFeed`] folds every pushed event into the current snapshot and
//! broadcasts it. Joining observers get the snapshot and a receiver taken
//! under the same lock, so no event falls between the two and none is seen
//! twice.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use tokio::sync::{Notify, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::{
    model::{
        AgentState, CostInfo, ProjectId, SessionId, Snapshot, TokenInfo, ToolCallId, ToolLogEntry, ToolLogKind,
    },
    protocol::SessionEvent,
    tasks::TaskList,
    traits::{JoinError, SessionSource},
};

const CHANNEL_CAPACITY: usize = 10_000;

struct FeedState {
    agent_state: AgentState,
    tool_log: Vec<ToolLogEntry>,
    tasks: TaskList,
    cost: CostInfo,
    token_info: TokenInfo,
}

impl FeedState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            agent_state: snapshot.agent_state,
            tool_log: snapshot.tool_log_entries,
            tasks: TaskList::from_tasks(snapshot.tasks),
            cost: snapshot.cost,
            token_info: snapshot.token_info,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            agent_state: self.agent_state.clone(),
            tool_log_entries: self.tool_log.clone(),
            tasks: self.tasks.tasks().to_vec(),
            cost: self.cost,
            token_info: self.token_info,
        }
    }

    // Returns false for events that break the log invariants; those are
    // neither folded nor broadcast.
    fn fold(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::AgentStateUpdate(state) => self.agent_state = state.clone(),
            SessionEvent::ToolLogAppend(entry) => {
                if self.has_entry(entry) {
                    warn!(tool_call_id = %entry.tool_call_id, kind = ?entry.kind, "duplicate tool log entry rejected");
                    return false;
                }
                self.tool_log.push(entry.clone());
            }
            SessionEvent::TaskDiffUpdate(diff) => {
                self.tasks.apply(diff.clone());
            }
            SessionEvent::CostUpdate { total_usd } => self.cost.total_usd = *total_usd,
            SessionEvent::TokenCount { current, max } => {
                self.token_info = TokenInfo {
                    current: *current,
                    max: *max,
                };
            }
            SessionEvent::SessionCleared => self.tool_log.clear(),
            SessionEvent::InterruptAcknowledged
            | SessionEvent::InterruptComplete
            | SessionEvent::InterruptError { .. }
            | SessionEvent::ServerError { .. } => {}
        }
        true
    }

    fn has_entry(&self, entry: &ToolLogEntry) -> bool {
        self.tool_log
            .iter()
            .any(|e| e.tool_call_id == entry.tool_call_id && e.kind == entry.kind)
    }
}

/// Fold + broadcast for a single session.
pub struct SessionFeed {
    session_id: SessionId,
    project_id: ProjectId,
    state: RwLock<FeedState>,
    sender: broadcast::Sender<SessionEvent>,
    interrupt: Notify,
}

impl SessionFeed {
    /// Create a feed starting from `initial`.
    #[must_use]
    pub fn new(project_id: ProjectId, session_id: SessionId, initial: Snapshot) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            session_id,
            project_id,
            state: RwLock::new(FeedState::from_snapshot(initial)),
            sender,
            interrupt: Notify::new(),
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub const fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Fold an event into the snapshot and send it to live observers.
    ///
    /// Returns false if the event was rejected (duplicate tool log entry).
    pub fn push(&self, event: SessionEvent) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.fold(&event) {
            return false;
        }
        // Sent under the lock so `subscribe` never splits an event.
        let _ = self.sender.send(event);
        true
    }

    pub fn push_agent_state(&self, state: AgentState) {
        self.push(SessionEvent::AgentStateUpdate(state));
    }

    pub fn push_tool_entry(&self, entry: ToolLogEntry) -> bool {
        self.push(SessionEvent::ToolLogAppend(entry))
    }

    pub fn push_cost(&self, total_usd: f64) {
        self.push(SessionEvent::CostUpdate { total_usd });
    }

    pub fn push_tokens(&self, current: u64, max: u64) {
        self.push(SessionEvent::TokenCount { current, max });
    }

    /// Current folded state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().unwrap_or_else(PoisonError::into_inner).snapshot()
    }

    /// Snapshot plus a receiver that continues exactly after it.
    #[must_use]
    pub fn subscribe(&self) -> (Snapshot, broadcast::Receiver<SessionEvent>) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.snapshot(), self.sender.subscribe())
    }

    /// Live events only. Lagged observers silently skip missed events, so
    /// this is meant for logging and tests; observers should `subscribe`.
    #[must_use]
    pub fn live_stream(&self) -> BoxStream<'static, SessionEvent> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }

    /// Whether a tool call has started but not ended.
    #[must_use]
    pub fn is_tool_open(&self, tool_call_id: &ToolCallId) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let has = |kind| {
            state
                .tool_log
                .iter()
                .any(|e| &e.tool_call_id == tool_call_id && e.kind == kind)
        };
        has(ToolLogKind::Start) && !has(ToolLogKind::End)
    }

    /// Record an interrupt request from an observer.
    pub fn request_interrupt(&self) {
        debug!(session_id = %self.session_id, "interrupt requested");
        self.interrupt.notify_one();
    }

    /// Wait for the next interrupt request. Used by the session owner.
    pub async fn interrupted(&self) {
        self.interrupt.notified().await;
    }

    /// Forward a stream of events into this feed.
    pub fn spawn_forwarder<S>(self: Arc<Self>, stream: S) -> tokio::task::JoinHandle<()>
    where
        S: futures::Stream<Item = SessionEvent> + Send + 'static,
    {
        tokio::spawn(async move {
            tokio::pin!(stream);

            while let Some(event) = stream.next().await {
                self.push(event);
            }
        })
    }
}

/// Registry of live session feeds.
#[derive(Default)]
pub struct SessionHub {
    feeds: RwLock<HashMap<SessionId, Arc<SessionFeed>>>,
}

impl SessionHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a feed for a new session with a generated id.
    pub fn create(&self, project_id: ProjectId, initial: Snapshot) -> Arc<SessionFeed> {
        self.insert(project_id, SessionId::generate(), initial)
    }

    /// Open (or replace) the feed of `session_id`.
    pub fn insert(&self, project_id: ProjectId, session_id: SessionId, initial: Snapshot) -> Arc<SessionFeed> {
        let feed = Arc::new(SessionFeed::new(project_id, session_id.clone(), initial));
        self.feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, Arc::clone(&feed));
        feed
    }

    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<Arc<SessionFeed>> {
        self.feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<SessionFeed>> {
        self.feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    fn lookup(&self, project_id: &ProjectId, session_id: &SessionId) -> Result<Arc<SessionFeed>, JoinError> {
        let feed = self
            .get(session_id)
            .ok_or_else(|| JoinError::NotFound(session_id.clone()))?;
        if feed.project_id() != project_id {
            return Err(JoinError::WrongProject(session_id.clone(), project_id.clone()));
        }
        Ok(feed)
    }
}

#[async_trait]
impl SessionSource for SessionHub {
    async fn join(
        &self,
        project_id: &ProjectId,
        session_id: &SessionId,
    ) -> Result<(Snapshot, broadcast::Receiver<SessionEvent>), JoinError> {
        Ok(self.lookup(project_id, session_id)?.subscribe())
    }

    async fn interrupt(&self, session_id: &SessionId) -> Result<(), JoinError> {
        let feed = self
            .get(session_id)
            .ok_or_else(|| JoinError::NotFound(session_id.clone()))?;
        feed.request_interrupt();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Task, TaskDiff, TaskStatus};

    fn feed() -> SessionFeed {
        SessionFeed::new(ProjectId::from("p1"), SessionId::from("s1"), Snapshot::default())
    }

    #[test]
    fn test_push_folds_into_snapshot() {
        let feed = feed();
        feed.push_tool_entry(ToolLogEntry::start("t1", "Bash", 1000));
        feed.push_agent_state(AgentState::tool_running("t1", Some(1000)));
        feed.push(SessionEvent::TaskDiffUpdate(TaskDiff::Add {
            task: Task::new("A", "first", TaskStatus::Pending),
        }));
        feed.push_cost(0.5);
        feed.push_tokens(10, 100);

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.tool_log_entries.len(), 1);
        assert!(snapshot.agent_state.is_running(&"t1".into()));
        assert_eq!(snapshot.tasks.len(), 1);
        assert!((snapshot.cost.total_usd - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.token_info.max, 100);
        assert!(feed.is_tool_open(&"t1".into()));
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let feed = feed();
        assert!(feed.push_tool_entry(ToolLogEntry::start("t1", "Bash", 1000)));
        assert!(!feed.push_tool_entry(ToolLogEntry::start("t1", "Bash", 1001)));
        assert_eq!(feed.snapshot().tool_log_entries.len(), 1);
    }

    #[test]
    fn test_session_clear_empties_log() {
        let feed = feed();
        feed.push_tool_entry(ToolLogEntry::start("t1", "Bash", 1000));
        feed.push(SessionEvent::SessionCleared);
        assert!(feed.snapshot().tool_log_entries.is_empty());
    }

    #[test]
    fn test_subscribe_continues_after_snapshot() {
        let feed = feed();
        feed.push_cost(1.0);
        let (snapshot, mut rx) = feed.subscribe();
        feed.push_cost(2.0);

        assert!((snapshot.cost.total_usd - 1.0).abs() < f64::EPSILON);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::CostUpdate { total_usd: 2.0 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_live_stream_yields_pushed_events() {
        let feed = Arc::new(feed());
        let mut live = feed.live_stream();
        feed.push(SessionEvent::InterruptAcknowledged);

        let next = tokio_test::block_on(live.next());
        assert_eq!(next, Some(SessionEvent::InterruptAcknowledged));
    }

    #[tokio::test]
    async fn test_hub_join_checks_session_and_project() {
        let hub = SessionHub::new();
        let feed = hub.insert(ProjectId::from("p1"), SessionId::from("s1"), Snapshot::default());
        feed.push_cost(0.25);

        let (snapshot, _rx) = hub
            .join(&ProjectId::from("p1"), &SessionId::from("s1"))
            .await
            .unwrap();
        assert!((snapshot.cost.total_usd - 0.25).abs() < f64::EPSILON);

        let missing = hub.join(&ProjectId::from("p1"), &SessionId::from("nope")).await;
        assert!(matches!(missing, Err(JoinError::NotFound(_))));

        let wrong = hub.join(&ProjectId::from("p2"), &SessionId::from("s1")).await;
        assert!(matches!(wrong, Err(JoinError::WrongProject(..))));
    }

    #[tokio::test]
    async fn test_interrupt_reaches_owner() {
        let hub = SessionHub::new();
        let feed = hub.create(ProjectId::from("p1"), Snapshot::default());
        hub.interrupt(feed.session_id()).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), feed.interrupted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forwarder_pushes_stream() {
        let feed = Arc::new(feed());
        let events = futures::stream::iter(vec![
            SessionEvent::CostUpdate { total_usd: 0.1 },
            SessionEvent::CostUpdate { total_usd: 0.2 },
        ]);
        Arc::clone(&feed).spawn_forwarder(events).await.unwrap();
        assert!((feed.snapshot().cost.total_usd - 0.2).abs() < f64::EPSILON);
    }
}
