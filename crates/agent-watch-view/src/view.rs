//! Session view orchestrator.
//!
//! [`ClientSessionView`] consumes transport input on a single sequential
//! dispatcher: server messages, connection signals, timer ticks and user
//! intents. It keeps at most one [`SessionViewContext`] and replaces it
//! wholesale on every join.

use std::collections::VecDeque;

use agent_watch_core::{
    Clock, ClientMessage, ConnectionStatus, Inbound, Outbound, Renderer, Scheduler, ServerMessage, SessionEvent,
    SessionId, Snapshot, SystemClock, TaskId, TimerId, TransportSignal, ViewConfig, ViewError,
};
use tracing::{debug, info, warn};

use crate::context::{JoinTarget, SessionViewContext, Surface, TickOutcome};

/// Client-side projection of one live agent session.
pub struct ClientSessionView<R, O, S, C = SystemClock> {
    renderer: R,
    outbound: O,
    scheduler: S,
    clock: C,
    config: ViewConfig,
    target: Option<JoinTarget>,
    context: Option<SessionViewContext>,
    /// Live events held while a join snapshot is outstanding.
    pending: Option<VecDeque<SessionEvent>>,
    connection: ConnectionStatus,
    critical_error: bool,
    input_enabled: bool,
}

impl<R, O, S, C> ClientSessionView<R, O, S, C>
where
    R: Renderer,
    O: Outbound,
    S: Scheduler,
    C: Clock,
{
    /// Create a detached view. Input starts disabled.
    #[must_use]
    pub const fn new(renderer: R, outbound: O, scheduler: S, clock: C, config: ViewConfig) -> Self {
        Self {
            renderer,
            outbound,
            scheduler,
            clock,
            config,
            target: None,
            context: None,
            pending: None,
            connection: ConnectionStatus::Connected,
            critical_error: false,
            input_enabled: false,
        }
    }

    /// Ask the server for a session's snapshot.
    ///
    /// Switching to another session leaves the current one first. Live
    /// events for the target are buffered until the snapshot is applied.
    ///
    /// # Errors
    /// Returns error if the join request could not be sent.
    pub fn request_join(&mut self, target: JoinTarget) -> Result<(), ViewError> {
        if self.target.as_ref().is_some_and(|current| current != &target) {
            self.leave();
        }
        info!(project_id = %target.project_id, session_id = %target.session_id, "joining session");
        let message = ClientMessage::JoinSession {
            project_id: target.project_id.clone(),
            session_id: target.session_id.clone(),
        };
        self.target = Some(target);
        self.pending = Some(VecDeque::new());
        self.refresh_input();
        self.send(message)
    }

    /// Hard reset onto `snapshot`.
    ///
    /// Clears every widget, timer and interrupt of the previous context,
    /// applies the snapshot, then replays events buffered while it was
    /// outstanding in arrival order. Safe to call any number of times.
    ///
    /// Joining a session other than the current target leaves the current
    /// one first; its buffered events are discarded, never replayed.
    pub fn join(&mut self, target: JoinTarget, snapshot: Snapshot) {
        if self.target.as_ref().is_some_and(|current| current != &target) {
            self.leave();
        }
        self.teardown_context();
        self.renderer.reset();
        let buffered = self.pending.take().unwrap_or_default();
        self.critical_error = false;

        info!(
            session_id = %target.session_id,
            tool_calls = snapshot.tool_log_entries.len(),
            tasks = snapshot.tasks.len(),
            buffered = buffered.len(),
            "applying session snapshot"
        );

        let mut context = SessionViewContext::new(target.clone(), self.config.interrupt_timeout());
        let mut surface = Surface {
            renderer: &mut self.renderer,
            scheduler: &mut self.scheduler,
            now: self.clock.now_ms(),
            tick: self.config.tick_interval(),
        };
        context.apply_snapshot(snapshot, &mut surface);
        for event in buffered {
            apply_live(&mut context, event, &mut surface, &mut self.critical_error);
        }

        self.target = Some(target);
        self.context = Some(context);
        self.refresh_input();
    }

    /// Handle a message from the server.
    pub fn handle_message(&mut self, message: ServerMessage) {
        match message.into_inbound() {
            Inbound::Joined {
                session_id,
                snapshot,
            } => self.on_joined(&session_id, snapshot),
            Inbound::JoinFailed { session_id, reason } => self.on_join_failed(&session_id, reason),
            Inbound::Event { session_id, event } => self.handle_event(&session_id, event),
        }
    }

    /// Apply a live event if it belongs to the current session.
    ///
    /// Events for any other session are dropped without a trace in the
    /// projection.
    pub fn handle_event(&mut self, session_id: &SessionId, event: SessionEvent) {
        let Some(target) = &self.target else {
            debug!(%session_id, event = event.name(), "event while detached dropped");
            return;
        };
        if &target.session_id != session_id {
            debug!(
                current = %target.session_id,
                %session_id,
                event = event.name(),
                "event for other session dropped"
            );
            return;
        }

        if let Some(buffer) = self.pending.as_mut() {
            if buffer.len() >= self.config.max_buffered_events {
                warn!(
                    %session_id,
                    limit = self.config.max_buffered_events,
                    "pre-snapshot buffer overflow, requesting a fresh snapshot"
                );
                buffer.clear();
                self.resend_join();
                return;
            }
            buffer.push_back(event);
            return;
        }

        let Some(context) = self.context.as_mut() else {
            return;
        };
        let mut surface = Surface {
            renderer: &mut self.renderer,
            scheduler: &mut self.scheduler,
            now: self.clock.now_ms(),
            tick: self.config.tick_interval(),
        };
        apply_live(context, event, &mut surface, &mut self.critical_error);
        self.refresh_input();
    }

    /// Handle a transport connection signal.
    ///
    /// On every (re)connect the join request of the current session is sent
    /// again; the previous projection stays visible until the new snapshot
    /// replaces it.
    pub fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Connected => {
                self.set_connection(ConnectionStatus::Connected);
                if self.target.is_some() {
                    info!("transport connected, rejoining session");
                    self.resend_join();
                }
            }
            TransportSignal::Disconnected { reason } => {
                warn!(%reason, "transport disconnected");
                self.set_connection(ConnectionStatus::Disconnected {
                    reason: reason.clone(),
                });
                self.renderer.error(&ViewError::Disconnected { reason });
            }
            TransportSignal::ConnectError { error } => {
                warn!(%error, "transport connect error");
                self.set_connection(ConnectionStatus::Failed { error: error.clone() });
                self.renderer.error(&ViewError::ConnectFailed { error });
            }
        }
        self.refresh_input();
    }

    /// Deliver a timer tick. Ticks of cancelled timers are ignored.
    pub fn on_tick(&mut self, timer: TimerId) {
        let Some(context) = self.context.as_mut() else {
            debug!(timer = timer.raw(), "tick without a session ignored");
            return;
        };
        let mut surface = Surface {
            renderer: &mut self.renderer,
            scheduler: &mut self.scheduler,
            now: self.clock.now_ms(),
            tick: self.config.tick_interval(),
        };
        if context.on_tick(timer, &mut surface) == TickOutcome::Stale {
            debug!(timer = timer.raw(), "stale tick ignored");
        }
        self.refresh_input();
    }

    /// Ask the server to interrupt the running agent.
    ///
    /// # Errors
    /// Returns `NotJoined` without a session, `InterruptPending` while a
    /// request is outstanding, or a transport error.
    pub fn request_interrupt(&mut self) -> Result<(), ViewError> {
        let Some(context) = self.context.as_mut() else {
            return Err(ViewError::NotJoined);
        };
        if let Err(e) = context.request_interrupt(&mut self.scheduler) {
            self.renderer.error(&e);
            return Err(e);
        }
        self.renderer.interrupt(context.interrupt().status());
        let session_id = context.target().session_id.clone();
        info!(%session_id, "interrupt requested");

        if let Err(e) = self.send(ClientMessage::InterruptSession { session_id }) {
            if let Some(context) = self.context.as_mut() {
                context.cancel_interrupt(&mut self.scheduler);
                self.renderer.interrupt(context.interrupt().status());
            }
            return Err(e);
        }
        self.refresh_input();
        Ok(())
    }

    /// Point the task selection at `task_id`.
    pub fn select_task(&mut self, task_id: &TaskId) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.select_task(task_id, &mut self.renderer))
    }

    /// Stop observing: cancel every timer and drop the projection.
    pub fn leave(&mut self) {
        if let Some(target) = self.target.take() {
            info!(session_id = %target.session_id, "leaving session");
            if self.connection.is_connected() {
                let sent = self.send(ClientMessage::LeaveSession {
                    session_id: target.session_id,
                });
                if let Err(e) = sent {
                    debug!(error = %e, "leave not delivered, tearing down anyway");
                }
            }
        }
        self.pending = None;
        self.critical_error = false;
        self.teardown_context();
        self.refresh_input();
    }

    fn on_joined(&mut self, session_id: &SessionId, snapshot: Snapshot) {
        match &self.target {
            Some(target) if &target.session_id == session_id => {
                let target = target.clone();
                self.join(target, snapshot);
            }
            _ => debug!(%session_id, "join response for another session dropped"),
        }
    }

    fn on_join_failed(&mut self, session_id: &SessionId, reason: String) {
        if self.target.as_ref().is_none_or(|t| &t.session_id != session_id) {
            debug!(%session_id, "join error for another session dropped");
            return;
        }
        warn!(%session_id, %reason, "join rejected");
        self.target = None;
        self.pending = None;
        self.teardown_context();
        self.renderer.error(&ViewError::Join {
            session_id: session_id.clone(),
            reason,
        });
        self.refresh_input();
    }

    fn resend_join(&mut self) {
        let Some(target) = &self.target else {
            return;
        };
        let message = ClientMessage::JoinSession {
            project_id: target.project_id.clone(),
            session_id: target.session_id.clone(),
        };
        self.pending = Some(VecDeque::new());
        // Failures already reach the renderer; the next reconnect retries.
        if let Err(e) = self.send(message) {
            debug!(error = %e, "join resend failed");
        }
    }

    fn send(&mut self, message: ClientMessage) -> Result<(), ViewError> {
        self.outbound.send(message).map_err(|e| {
            warn!(error = %e, "outbound send failed");
            let err = ViewError::from(e);
            self.renderer.error(&err);
            err
        })
    }

    fn teardown_context(&mut self) {
        if let Some(context) = self.context.take() {
            debug!(
                session_id = %context.target().session_id,
                tickers = context.active_tickers(),
                "tearing down session context"
            );
            context.teardown(&mut self.renderer, &mut self.scheduler);
        }
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection != status {
            self.renderer.connection(&status);
            self.connection = status;
        }
    }

    fn refresh_input(&mut self) {
        let enabled = self.connection.is_connected()
            && self.pending.is_none()
            && !self.critical_error
            && self
                .context
                .as_ref()
                .is_some_and(|c| !c.interrupt().is_outstanding());
        if enabled != self.input_enabled {
            self.input_enabled = enabled;
            self.renderer.input_enabled(enabled);
        }
    }

    #[must_use]
    pub const fn context(&self) -> Option<&SessionViewContext> {
        self.context.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.target.as_ref().map(|t| &t.session_id)
    }

    #[must_use]
    pub const fn target(&self) -> Option<&JoinTarget> {
        self.target.as_ref()
    }

    #[must_use]
    pub const fn is_awaiting_snapshot(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub const fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    #[must_use]
    pub const fn config(&self) -> &ViewConfig {
        &self.config
    }

    #[must_use]
    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    pub const fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[must_use]
    pub const fn outbound(&self) -> &O {
        &self.outbound
    }

    pub const fn outbound_mut(&mut self) -> &mut O {
        &mut self.outbound
    }

    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub const fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Tear down and hand back the renderer.
    pub fn into_renderer(mut self) -> R {
        self.leave();
        self.renderer
    }
}

fn apply_live<R: Renderer, S: Scheduler>(
    context: &mut SessionViewContext,
    event: SessionEvent,
    surface: &mut Surface<'_, R, S>,
    critical_error: &mut bool,
) {
    if let SessionEvent::ServerError { message, critical } = &event {
        warn!(session_id = %context.target().session_id, %message, critical, "server error");
        if *critical {
            *critical_error = true;
        }
    }
    context.apply_event(event, surface);
}
