//! Demo observer following a simulated agent session.
//!
//! Run with: cargo run -p agent-watch-observer [log|serve|tui]
//!
//! - `log` (default): joins in-process and logs every render call, sends
//!   an interrupt after a few seconds.
//! - `serve`: serves the session to websocket observers on
//!   `ws://127.0.0.1:3000/ws`.
//! - `tui`: full terminal view. Esc interrupts, q quits.

mod sim;

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use agent_watch_core::{
    AgentState, ConnectionStatus, CostDisplay, InterruptStatus, ProjectId, Renderer, SessionHub, SessionSource,
    Snapshot, Task, TaskId, TokenInfo, ToolCallId, ToolWidgetView, ViewConfig, ViewError,
};
use agent_watch_transport::{
    InProcessConnection, SessionDriver,
    tui::{KeyAction, TuiRenderer},
    websocket::create_ws_router,
};
use agent_watch_view::JoinTarget;
use anyhow::Context;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROJECT: &str = "demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = std::env::args().nth(1).unwrap_or_else(|| "log".to_owned());

    // The terminal view owns stdout.
    if mode != "tui" {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .init();
    }

    let config = ViewConfig::from_env().context("invalid observer configuration")?;
    let hub = Arc::new(SessionHub::new());
    let feed = hub.create(ProjectId::from(PROJECT), Snapshot::default());
    let target = JoinTarget::new(PROJECT, feed.session_id().clone());
    tokio::spawn(sim::run(Arc::clone(&feed)));

    match mode.as_str() {
        "log" => run_logged(hub, target, config).await,
        "serve" => serve(hub, &target).await,
        "tui" => run_tui(hub, target, config).await,
        other => anyhow::bail!("unknown mode {other:?}, expected log, serve or tui"),
    }
}

async fn run_logged(hub: Arc<SessionHub>, target: JoinTarget, config: ViewConfig) -> anyhow::Result<()> {
    let connection = InProcessConnection::connect(hub);
    let (driver, handle) = SessionDriver::new(LogRenderer, connection.outbound, connection.incoming, config);
    let task = tokio::spawn(driver.run());

    handle.join(target)?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = tokio::time::sleep(Duration::from_secs(4)) => {
            info!("sending interrupt");
            handle.interrupt()?;
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
    }

    handle.shutdown()?;
    task.await.context("driver task panicked")?;
    Ok(())
}

async fn serve(hub: Arc<SessionHub>, target: &JoinTarget) -> anyhow::Result<()> {
    let source: Arc<dyn SessionSource> = hub;
    let app = create_ws_router(source);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!(
        project_id = %target.project_id,
        session_id = %target.session_id,
        "Relay listening on ws://{addr}/ws"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_tui(hub: Arc<SessionHub>, target: JoinTarget, config: ViewConfig) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let renderer = TuiRenderer::new();
    let connection = InProcessConnection::connect(hub);
    let (driver, handle) = SessionDriver::new(renderer.clone(), connection.outbound, connection.incoming, config);
    let task = tokio::spawn(driver.run());
    handle.join(target)?;

    let result = async {
        loop {
            terminal.draw(|f| renderer.draw(f))?;
            if !event::poll(Duration::from_millis(50))? {
                continue;
            }
            let Some(action) = KeyAction::from_event(&event::read()?) else {
                continue;
            };
            if action == KeyAction::Quit {
                break;
            }
            if let Some(command) = renderer.command_for(action) {
                handle.send(command)?;
            }
        }
        anyhow::Ok(())
    }
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    handle.shutdown()?;
    task.await.context("driver task panicked")?;
    result
}

/// Renderer that logs every call.
struct LogRenderer;

impl Renderer for LogRenderer {
    fn show_widget(&mut self, widget: &ToolWidgetView) {
        info!(
            tool_call_id = %widget.tool_call_id,
            tool = %widget.tool_name,
            phase = ?widget.phase,
            label = widget.label.as_deref().unwrap_or(""),
            "{} widget shown",
            widget.icon.glyph()
        );
    }

    fn update_widget(&mut self, widget: &ToolWidgetView) {
        // Ticks of active widgets are too chatty for info.
        if widget.phase.is_terminal() {
            info!(
                tool_call_id = %widget.tool_call_id,
                phase = ?widget.phase,
                elapsed = %widget.elapsed_display(),
                "widget finished"
            );
        } else {
            tracing::debug!(tool_call_id = %widget.tool_call_id, elapsed = %widget.elapsed_display(), "widget tick");
        }
    }

    fn remove_widget(&mut self, tool_call_id: &ToolCallId) {
        info!(%tool_call_id, "widget removed");
    }

    fn agent_state(&mut self, state: &AgentState) {
        info!(status = ?state.status(), text = state.status_text.as_deref().unwrap_or(""), "agent state");
    }

    fn tasks(&mut self, tasks: &[Task], selected: Option<&TaskId>) {
        let summary: Vec<String> = tasks.iter().map(|t| format!("{}:{:?}", t.id, t.status)).collect();
        info!(tasks = ?summary, selected = ?selected, "tasks");
    }

    fn cost(&mut self, cost: &CostDisplay) {
        info!(animate = cost.animate, "cost {cost}");
    }

    fn tokens(&mut self, tokens: &TokenInfo) {
        info!(current = tokens.current, max = tokens.max, "tokens");
    }

    fn interrupt(&mut self, status: InterruptStatus) {
        info!(?status, "interrupt");
    }

    fn input_enabled(&mut self, enabled: bool) {
        info!(enabled, "input");
    }

    fn connection(&mut self, status: &ConnectionStatus) {
        info!(?status, "connection");
    }

    fn error(&mut self, error: &ViewError) {
        warn!(%error, "view error");
    }

    fn reset(&mut self) {
        info!("view reset");
    }
}
