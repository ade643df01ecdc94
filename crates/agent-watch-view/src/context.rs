//! Projection state of one joined session.
//!
//! A [`SessionViewContext`] is built fresh for every join and torn down
//! wholesale on leave or rejoin. It owns every timer it arms, so tearing it
//! down cancels all of them.

use std::{collections::HashMap, time::Duration};

use agent_watch_core::{
    AgentState, Millis, ProjectId, Renderer, Scheduler, SessionEvent, SessionId, Snapshot, TaskId, TaskList,
    TimerId, TimerSchedule, ToolCallId, ToolLogEntry, ToolWidgetView, ViewError,
};
use tracing::{debug, warn};

use crate::{
    cost::CostAccumulator,
    interrupt::{InterruptCoordinator, InterruptOutcome},
    projector::{self, ToolCallEntries},
};

/// Session a view is (or is becoming) joined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinTarget {
    pub project_id: ProjectId,
    pub session_id: SessionId,
}

impl JoinTarget {
    #[must_use]
    pub fn new(project_id: impl Into<ProjectId>, session_id: impl Into<SessionId>) -> Self {
        Self {
            project_id: project_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Collaborators a context writes through while handling one input.
pub(crate) struct Surface<'a, R, S> {
    pub renderer: &'a mut R,
    pub scheduler: &'a mut S,
    pub now: Millis,
    pub tick: Duration,
}

/// Append-only tool log of the session, indexed by call.
#[derive(Debug, Default)]
struct ToolLog {
    entries: Vec<ToolLogEntry>,
    calls: HashMap<ToolCallId, ToolCallEntries>,
    order: Vec<ToolCallId>,
}

impl ToolLog {
    fn record(&mut self, entry: ToolLogEntry) -> Result<ToolCallId, projector::EntryRejected> {
        let id = entry.tool_call_id.clone();
        let call = self.calls.entry(id.clone()).or_insert_with(|| {
            self.order.push(id.clone());
            ToolCallEntries::new(id.clone())
        });
        call.record(entry.clone())?;
        self.entries.push(entry);
        Ok(id)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.calls.clear();
        self.order.clear();
    }
}

#[derive(Debug)]
struct WidgetSlot {
    view: ToolWidgetView,
    ticker: Option<TimerId>,
}

/// What a timer tick belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Widget,
    InterruptTimedOut,
    Stale,
}

/// Client-side projection of one joined session.
#[derive(Debug)]
pub struct SessionViewContext {
    target: JoinTarget,
    agent_state: AgentState,
    tool_log: ToolLog,
    widgets: HashMap<ToolCallId, WidgetSlot>,
    tickers: HashMap<TimerId, ToolCallId>,
    tasks: TaskList,
    cost: CostAccumulator,
    interrupt: InterruptCoordinator,
}

impl SessionViewContext {
    #[must_use]
    pub fn new(target: JoinTarget, interrupt_timeout: Duration) -> Self {
        Self {
            target,
            agent_state: AgentState::idle(),
            tool_log: ToolLog::default(),
            widgets: HashMap::new(),
            tickers: HashMap::new(),
            tasks: TaskList::new(),
            cost: CostAccumulator::new(),
            interrupt: InterruptCoordinator::new(interrupt_timeout),
        }
    }

    /// Apply a join snapshot to this fresh context, as if every datum had
    /// just arrived.
    pub(crate) fn apply_snapshot<R: Renderer, S: Scheduler>(&mut self, snapshot: Snapshot, surface: &mut Surface<'_, R, S>) {
        // Agent state first so replayed tool calls project against it.
        self.agent_state = snapshot.agent_state;
        surface.renderer.agent_state(&self.agent_state);

        // Whole history first, so finished calls show up completed.
        for entry in snapshot.tool_log_entries {
            if let Err(rejected) = self.tool_log.record(entry) {
                warn!(session_id = %self.target.session_id, %rejected, "snapshot tool log entry ignored");
            }
        }
        let calls = self.tool_log.order.clone();
        for tool_call_id in &calls {
            self.refresh_widget(tool_call_id, surface);
        }

        self.tasks.set_all(snapshot.tasks);
        surface.renderer.tasks(self.tasks.tasks(), self.tasks.selected());

        let cost = self.cost.set(snapshot.cost.total_usd);
        surface.renderer.cost(&cost);
        let tokens = self
            .cost
            .set_tokens(snapshot.token_info.current, snapshot.token_info.max);
        surface.renderer.tokens(&tokens);

        surface.renderer.interrupt(self.interrupt.status());
    }

    /// Apply one live event. Server errors are handled by the view.
    pub(crate) fn apply_event<R: Renderer, S: Scheduler>(&mut self, event: SessionEvent, surface: &mut Surface<'_, R, S>) {
        match event {
            SessionEvent::AgentStateUpdate(state) => {
                self.agent_state = state;
                surface.renderer.agent_state(&self.agent_state);
                self.refresh_open_widgets(surface);
            }
            SessionEvent::ToolLogAppend(entry) => self.append_entry(entry, surface),
            SessionEvent::TaskDiffUpdate(diff) => {
                if self.tasks.apply(diff).changed() {
                    surface.renderer.tasks(self.tasks.tasks(), self.tasks.selected());
                }
            }
            SessionEvent::CostUpdate { total_usd } => {
                let cost = self.cost.update(total_usd);
                surface.renderer.cost(&cost);
            }
            SessionEvent::TokenCount { current, max } => {
                let tokens = self.cost.set_tokens(current, max);
                surface.renderer.tokens(&tokens);
            }
            SessionEvent::InterruptAcknowledged => {
                if self.interrupt.acknowledge() {
                    surface.renderer.interrupt(self.interrupt.status());
                }
            }
            SessionEvent::InterruptComplete => {
                if self.interrupt.complete(surface.scheduler).is_some() {
                    surface.renderer.interrupt(self.interrupt.status());
                }
            }
            SessionEvent::InterruptError { message } => {
                if let Some(InterruptOutcome::Errored(message)) = self.interrupt.fail(message, surface.scheduler) {
                    surface.renderer.interrupt(self.interrupt.status());
                    surface.renderer.error(&ViewError::Interrupt(message));
                }
            }
            SessionEvent::SessionCleared => self.clear_tool_log(surface),
            SessionEvent::ServerError { message, critical } => {
                surface.renderer.error(&ViewError::Server { message, critical });
            }
        }
    }

    /// Route a timer tick to the widget or interrupt deadline owning it.
    pub(crate) fn on_tick<R: Renderer, S: Scheduler>(&mut self, timer: TimerId, surface: &mut Surface<'_, R, S>) -> TickOutcome {
        if self.interrupt.owns_timer(timer) {
            if self.interrupt.on_timer(timer).is_some() {
                surface.renderer.interrupt(self.interrupt.status());
                surface
                    .renderer
                    .error(&ViewError::InterruptTimedOut(self.interrupt.timeout()));
            }
            return TickOutcome::InterruptTimedOut;
        }
        match self.tickers.get(&timer).cloned() {
            Some(tool_call_id) => {
                self.refresh_widget(&tool_call_id, surface);
                TickOutcome::Widget
            }
            None => TickOutcome::Stale,
        }
    }

    pub(crate) fn request_interrupt<S: Scheduler>(&mut self, scheduler: &mut S) -> Result<(), ViewError> {
        self.interrupt.request(scheduler)
    }

    pub(crate) fn cancel_interrupt<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.interrupt.reset(scheduler);
    }

    pub(crate) fn select_task<R: Renderer>(&mut self, task_id: &TaskId, renderer: &mut R) -> bool {
        if !self.tasks.select(task_id) {
            return false;
        }
        renderer.tasks(self.tasks.tasks(), self.tasks.selected());
        true
    }

    /// Cancel every timer and remove every widget from the renderer.
    pub(crate) fn teardown<R: Renderer, S: Scheduler>(mut self, renderer: &mut R, scheduler: &mut S) {
        self.interrupt.reset(scheduler);
        for (tool_call_id, slot) in self.widgets.drain() {
            if let Some(ticker) = slot.ticker {
                scheduler.cancel(ticker);
            }
            renderer.remove_widget(&tool_call_id);
        }
        self.tickers.clear();
    }

    fn append_entry<R: Renderer, S: Scheduler>(&mut self, entry: ToolLogEntry, surface: &mut Surface<'_, R, S>) {
        match self.tool_log.record(entry) {
            Ok(tool_call_id) => self.refresh_widget(&tool_call_id, surface),
            Err(rejected) => warn!(session_id = %self.target.session_id, %rejected, "tool log entry ignored"),
        }
    }

    fn refresh_open_widgets<R: Renderer, S: Scheduler>(&mut self, surface: &mut Surface<'_, R, S>) {
        let open: Vec<ToolCallId> = self
            .tool_log
            .order
            .iter()
            .filter(|id| self.widgets.get(*id).is_some_and(|w| !w.view.phase.is_terminal()))
            .cloned()
            .collect();
        for tool_call_id in open {
            self.refresh_widget(&tool_call_id, surface);
        }
    }

    // Recompute one widget, render it if it changed and keep its ticker in
    // line with its phase.
    fn refresh_widget<R: Renderer, S: Scheduler>(&mut self, tool_call_id: &ToolCallId, surface: &mut Surface<'_, R, S>) {
        let Some(entries) = self.tool_log.calls.get(tool_call_id) else {
            return;
        };
        let view = projector::project(tool_call_id, entries, &self.agent_state, surface.now);
        let terminal = view.phase.is_terminal();

        if let Some(slot) = self.widgets.get_mut(tool_call_id) {
            if slot.view != view {
                surface.renderer.update_widget(&view);
                slot.view = view;
            }
        } else {
            surface.renderer.show_widget(&view);
            self.widgets
                .insert(tool_call_id.clone(), WidgetSlot { view, ticker: None });
        }
        let Some(slot) = self.widgets.get_mut(tool_call_id) else {
            return;
        };

        match (terminal, slot.ticker) {
            (true, Some(ticker)) => {
                surface.scheduler.cancel(ticker);
                slot.ticker = None;
                self.tickers.remove(&ticker);
                debug!(%tool_call_id, "widget finished, ticker cancelled");
            }
            (false, None) => {
                let ticker = surface.scheduler.arm(TimerSchedule::Every(surface.tick));
                slot.ticker = Some(ticker);
                self.tickers.insert(ticker, tool_call_id.clone());
            }
            _ => {}
        }
    }

    fn clear_tool_log<R: Renderer, S: Scheduler>(&mut self, surface: &mut Surface<'_, R, S>) {
        for (tool_call_id, slot) in self.widgets.drain() {
            if let Some(ticker) = slot.ticker {
                surface.scheduler.cancel(ticker);
            }
            surface.renderer.remove_widget(&tool_call_id);
        }
        self.tickers.clear();
        self.tool_log.clear();
    }

    #[must_use]
    pub const fn target(&self) -> &JoinTarget {
        &self.target
    }

    #[must_use]
    pub const fn agent_state(&self) -> &AgentState {
        &self.agent_state
    }

    /// Last rendered view of a tool call.
    #[must_use]
    pub fn widget(&self, tool_call_id: &ToolCallId) -> Option<&ToolWidgetView> {
        self.widgets.get(tool_call_id).map(|w| &w.view)
    }

    /// Last rendered views, in order of first appearance.
    pub fn widgets(&self) -> impl Iterator<Item = &ToolWidgetView> {
        self.tool_log
            .order
            .iter()
            .filter_map(|id| self.widgets.get(id).map(|w| &w.view))
    }

    /// Recompute a widget from the durable inputs at `now`.
    #[must_use]
    pub fn project(&self, tool_call_id: &ToolCallId, now: Millis) -> Option<ToolWidgetView> {
        self.tool_log
            .calls
            .get(tool_call_id)
            .map(|entries| projector::project(tool_call_id, entries, &self.agent_state, now))
    }

    #[must_use]
    pub fn tool_log(&self) -> &[ToolLogEntry] {
        &self.tool_log.entries
    }

    #[must_use]
    pub const fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    #[must_use]
    pub const fn cost(&self) -> &CostAccumulator {
        &self.cost
    }

    #[must_use]
    pub const fn interrupt(&self) -> &InterruptCoordinator {
        &self.interrupt
    }

    /// Number of widget tickers currently armed.
    #[must_use]
    pub fn active_tickers(&self) -> usize {
        self.tickers.len()
    }
}
