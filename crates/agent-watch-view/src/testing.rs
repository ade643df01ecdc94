//! Recording [`Renderer`] and [`Outbound`] implementations for tests.

use std::collections::BTreeMap;

use agent_watch_core::{
    AgentState, ClientMessage, ConnectionStatus, CostDisplay, InterruptStatus, Outbound, Renderer, Task, TaskId,
    TokenInfo, ToolCallId, ToolWidgetView, TransportError, ViewError,
};

/// One call made on a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    ShowWidget(ToolWidgetView),
    UpdateWidget(ToolWidgetView),
    RemoveWidget(ToolCallId),
    AgentState(AgentState),
    Tasks(Vec<Task>, Option<TaskId>),
    Cost(CostDisplay),
    Tokens(TokenInfo),
    Interrupt(InterruptStatus),
    InputEnabled(bool),
    Connection(ConnectionStatus),
    Error(ViewError),
    Reset,
}

/// Renderer that keeps every call plus a mirror of what is on screen.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
    pub widgets: BTreeMap<ToolCallId, ToolWidgetView>,
    pub agent_state: AgentState,
    pub tasks: Vec<Task>,
    pub selected: Option<TaskId>,
    pub cost: Option<CostDisplay>,
    pub tokens: TokenInfo,
    pub interrupt: InterruptStatus,
    pub input_enabled: bool,
    pub connection: ConnectionStatus,
    pub errors: Vec<ViewError>,
    /// Updates or removals of widgets that were never shown (or already
    /// removed).
    pub stray_widget_calls: usize,
}

impl RecordingRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn widget(&self, tool_call_id: &str) -> Option<&ToolWidgetView> {
        self.widgets.get(&ToolCallId::from(tool_call_id))
    }

    /// Drain the recorded calls.
    pub fn take_calls(&mut self) -> Vec<RenderCall> {
        std::mem::take(&mut self.calls)
    }
}

impl Renderer for RecordingRenderer {
    fn show_widget(&mut self, widget: &ToolWidgetView) {
        self.calls.push(RenderCall::ShowWidget(widget.clone()));
        self.widgets.insert(widget.tool_call_id.clone(), widget.clone());
    }

    fn update_widget(&mut self, widget: &ToolWidgetView) {
        self.calls.push(RenderCall::UpdateWidget(widget.clone()));
        match self.widgets.get_mut(&widget.tool_call_id) {
            Some(shown) => *shown = widget.clone(),
            None => self.stray_widget_calls += 1,
        }
    }

    fn remove_widget(&mut self, tool_call_id: &ToolCallId) {
        self.calls.push(RenderCall::RemoveWidget(tool_call_id.clone()));
        if self.widgets.remove(tool_call_id).is_none() {
            self.stray_widget_calls += 1;
        }
    }

    fn agent_state(&mut self, state: &AgentState) {
        self.calls.push(RenderCall::AgentState(state.clone()));
        self.agent_state = state.clone();
    }

    fn tasks(&mut self, tasks: &[Task], selected: Option<&TaskId>) {
        self.calls
            .push(RenderCall::Tasks(tasks.to_vec(), selected.cloned()));
        self.tasks = tasks.to_vec();
        self.selected = selected.cloned();
    }

    fn cost(&mut self, cost: &CostDisplay) {
        self.calls.push(RenderCall::Cost(*cost));
        self.cost = Some(*cost);
    }

    fn tokens(&mut self, tokens: &TokenInfo) {
        self.calls.push(RenderCall::Tokens(*tokens));
        self.tokens = *tokens;
    }

    fn interrupt(&mut self, status: InterruptStatus) {
        self.calls.push(RenderCall::Interrupt(status));
        self.interrupt = status;
    }

    fn input_enabled(&mut self, enabled: bool) {
        self.calls.push(RenderCall::InputEnabled(enabled));
        self.input_enabled = enabled;
    }

    fn connection(&mut self, status: &ConnectionStatus) {
        self.calls.push(RenderCall::Connection(status.clone()));
        self.connection = status.clone();
    }

    fn error(&mut self, error: &ViewError) {
        self.calls.push(RenderCall::Error(error.clone()));
        self.errors.push(error.clone());
    }

    fn reset(&mut self) {
        self.calls.push(RenderCall::Reset);
        self.widgets.clear();
        self.tasks.clear();
        self.selected = None;
        self.cost = None;
        self.tokens = TokenInfo::default();
        self.interrupt = InterruptStatus::Idle;
    }
}

/// Outbound sink that keeps every message. Set `closed` to fail sends.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    pub sent: Vec<ClientMessage>,
    pub closed: bool,
}

impl Outbound for RecordingOutbound {
    fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        self.sent.push(message);
        Ok(())
    }
}
