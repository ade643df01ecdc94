//! Terminal front end for ratatui applications.
//!
//! [`TuiRenderer`] is the view's [`Renderer`]; clones share one screen
//! model, so the driver task writes while the draw loop reads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agent_watch_core::{
    Activity, AgentState, ConnectionStatus, CostDisplay, InterruptStatus, Renderer, Task, TaskId, TaskStatus,
    TokenInfo, ToolCallId, ToolWidgetView, ViewError, WidgetPhase,
};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::driver::ViewCommand;

/// Everything currently on screen.
#[derive(Debug, Default)]
pub struct Screen {
    pub widgets: Vec<ToolWidgetView>,
    pub agent_state: AgentState,
    pub tasks: Vec<Task>,
    pub selected: Option<TaskId>,
    pub cost: Option<CostDisplay>,
    pub tokens: TokenInfo,
    pub interrupt: InterruptStatus,
    pub input_enabled: bool,
    pub connection: ConnectionStatus,
    pub last_error: Option<String>,
    dirty: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TuiRenderer {
    screen: Arc<Mutex<Screen>>,
}

impl TuiRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the screen model.
    pub fn screen(&self) -> MutexGuard<'_, Screen> {
        self.screen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether anything changed since the last call.
    pub fn take_dirty(&self) -> bool {
        std::mem::take(&mut self.screen().dirty)
    }

    /// Draw the whole screen into `frame`.
    pub fn draw(&self, frame: &mut Frame) {
        let screen = self.screen();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(3), Constraint::Length(1)])
            .split(frame.area());
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);

        render_status(frame, &screen, rows[0]);
        render_tools(frame, &screen, body[0]);
        render_tasks(frame, &screen, body[1]);
        render_footer(frame, &screen, rows[2]);
    }

    /// Map a key action to a view command, given what is on screen.
    #[must_use]
    pub fn command_for(&self, action: KeyAction) -> Option<ViewCommand> {
        let screen = self.screen();
        match action {
            KeyAction::Interrupt => screen.input_enabled.then_some(ViewCommand::Interrupt),
            KeyAction::NextTask => step_selection(&screen, 1).map(ViewCommand::SelectTask),
            KeyAction::PreviousTask => step_selection(&screen, -1).map(ViewCommand::SelectTask),
            KeyAction::Quit => Some(ViewCommand::Shutdown),
        }
    }

    fn touch(&self, f: impl FnOnce(&mut Screen)) {
        let mut screen = self.screen();
        f(&mut screen);
        screen.dirty = true;
    }
}

impl Renderer for TuiRenderer {
    fn show_widget(&mut self, widget: &ToolWidgetView) {
        self.touch(|s| s.widgets.push(widget.clone()));
    }

    fn update_widget(&mut self, widget: &ToolWidgetView) {
        self.touch(|s| {
            if let Some(shown) = s
                .widgets
                .iter_mut()
                .find(|w| w.tool_call_id == widget.tool_call_id)
            {
                *shown = widget.clone();
            }
        });
    }

    fn remove_widget(&mut self, tool_call_id: &ToolCallId) {
        self.touch(|s| s.widgets.retain(|w| &w.tool_call_id != tool_call_id));
    }

    fn agent_state(&mut self, state: &AgentState) {
        self.touch(|s| s.agent_state = state.clone());
    }

    fn tasks(&mut self, tasks: &[Task], selected: Option<&TaskId>) {
        self.touch(|s| {
            s.tasks = tasks.to_vec();
            s.selected = selected.cloned();
        });
    }

    fn cost(&mut self, cost: &CostDisplay) {
        self.touch(|s| s.cost = Some(*cost));
    }

    fn tokens(&mut self, tokens: &TokenInfo) {
        self.touch(|s| s.tokens = *tokens);
    }

    fn interrupt(&mut self, status: InterruptStatus) {
        self.touch(|s| s.interrupt = status);
    }

    fn input_enabled(&mut self, enabled: bool) {
        self.touch(|s| s.input_enabled = enabled);
    }

    fn connection(&mut self, status: &ConnectionStatus) {
        self.touch(|s| s.connection = status.clone());
    }

    fn error(&mut self, error: &ViewError) {
        self.touch(|s| s.last_error = Some(error.to_string()));
    }

    fn reset(&mut self) {
        self.touch(|s| {
            s.widgets.clear();
            s.tasks.clear();
            s.selected = None;
            s.cost = None;
            s.tokens = TokenInfo::default();
            s.interrupt = InterruptStatus::Idle;
            s.last_error = None;
        });
    }
}

/// Keys the observer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Interrupt,
    NextTask,
    PreviousTask,
    Quit,
}

impl KeyAction {
    /// Esc and Ctrl-C interrupt, j/k or arrows move the task selection and
    /// q quits.
    #[must_use]
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Self::Interrupt),
            KeyCode::Esc => Some(Self::Interrupt),
            KeyCode::Down | KeyCode::Char('j') => Some(Self::NextTask),
            KeyCode::Up | KeyCode::Char('k') => Some(Self::PreviousTask),
            KeyCode::Char('q') => Some(Self::Quit),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Key(key) => Self::from_key(key),
            _ => None,
        }
    }
}

fn step_selection(screen: &Screen, delta: isize) -> Option<TaskId> {
    if screen.tasks.is_empty() {
        return None;
    }
    let last = screen.tasks.len() - 1;
    let next = match screen
        .selected
        .as_ref()
        .and_then(|id| screen.tasks.iter().position(|t| &t.id == id))
    {
        Some(current) => current.saturating_add_signed(delta).min(last),
        None if delta < 0 => last,
        None => 0,
    };
    screen.tasks.get(next).map(|t| t.id.clone())
}

fn phase_style(phase: WidgetPhase) -> Style {
    match phase {
        WidgetPhase::Pending => Style::default().fg(Color::DarkGray),
        WidgetPhase::Active => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        WidgetPhase::Completed => Style::default().fg(Color::Green),
        WidgetPhase::Errored => Style::default().fg(Color::Red),
    }
}

const fn task_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Done => "[x]",
        TaskStatus::Cancelled => "[-]",
    }
}

fn render_status(frame: &mut Frame, screen: &Screen, area: Rect) {
    let activity = match &screen.agent_state.activity {
        Activity::Idle => "idle".to_owned(),
        Activity::Thinking => screen
            .agent_state
            .status_text
            .clone()
            .unwrap_or_else(|| "thinking".to_owned()),
        Activity::ToolRunning { tool_call_id } => format!("running {tool_call_id}"),
    };
    let cost = screen.cost.map_or_else(|| "-".to_owned(), |c| c.to_string());
    let connection = match &screen.connection {
        ConnectionStatus::Connected => Span::styled("connected", Color::Green),
        ConnectionStatus::Disconnected { reason } => Span::styled(format!("disconnected: {reason}"), Color::Yellow),
        ConnectionStatus::Failed { error } => Span::styled(format!("failed: {error}"), Color::Red),
    };
    let line = Line::from(vec![
        Span::styled(activity, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  cost {cost}  tokens {}/{}  ", screen.tokens.current, screen.tokens.max)),
        connection,
    ]);
    let block = Block::default().borders(Borders::ALL).title("Session");
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_tools(frame: &mut Frame, screen: &Screen, area: Rect) {
    let items: Vec<ListItem> = screen
        .widgets
        .iter()
        .map(|w| {
            let mut spans = vec![
                Span::raw(format!("{} ", w.icon.glyph())),
                Span::styled(w.tool_name.clone(), phase_style(w.phase)),
                Span::raw(format!(" {}", w.elapsed_display())),
            ];
            if let Some(label) = &w.label {
                spans.push(Span::styled(format!("  {label}"), Color::Gray));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    let block = Block::default().borders(Borders::ALL).title("Tools");
    frame.render_widget(List::new(items).block(block), area);
}

fn render_tasks(frame: &mut Frame, screen: &Screen, area: Rect) {
    let items: Vec<ListItem> = screen
        .tasks
        .iter()
        .map(|t| ListItem::new(format!("{} {}", task_marker(t.status), t.text)))
        .collect();
    let selected = screen
        .selected
        .as_ref()
        .and_then(|id| screen.tasks.iter().position(|t| &t.id == id));
    let mut state = ListState::default().with_selected(selected);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Tasks"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer(frame: &mut Frame, screen: &Screen, area: Rect) {
    let line = if let Some(error) = &screen.last_error {
        Line::from(Span::styled(error.clone(), Color::Red))
    } else {
        match screen.interrupt {
            InterruptStatus::Requested => Line::from("Interrupt requested..."),
            InterruptStatus::Acknowledged => Line::from("Interrupting..."),
            InterruptStatus::Idle if screen.input_enabled => Line::from("Esc interrupt  j/k tasks  q quit"),
            InterruptStatus::Idle => Line::from(Span::styled("input disabled", Color::DarkGray)),
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}
