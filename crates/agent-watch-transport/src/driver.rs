//! Async driver running a [`ClientSessionView`] on one task.
//!
//! Transport input, timer ticks and user commands are multiplexed with
//! `tokio::select!` and handed to the view one at a time, so the view
//! itself never needs locking.

use agent_watch_core::{
    Outbound, Renderer, SystemClock, TaskId, TimerId, TransportError, TransportSignal, ViewConfig,
};
use agent_watch_view::{ClientSessionView, JoinTarget};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{channel::Incoming, scheduler::TokioScheduler};

/// User intent sent to a running driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    Join(JoinTarget),
    Leave,
    Interrupt,
    SelectTask(TaskId),
    Shutdown,
}

/// Cloneable handle for sending commands to a driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<ViewCommand>,
}

impl DriverHandle {
    /// Send a command.
    ///
    /// # Errors
    /// Returns error if the driver has stopped.
    pub fn send(&self, command: ViewCommand) -> Result<(), TransportError> {
        self.tx.send(command).map_err(|_| TransportError::ChannelClosed)
    }

    /// # Errors
    /// Returns error if the driver has stopped.
    pub fn join(&self, target: JoinTarget) -> Result<(), TransportError> {
        self.send(ViewCommand::Join(target))
    }

    /// # Errors
    /// Returns error if the driver has stopped.
    pub fn interrupt(&self) -> Result<(), TransportError> {
        self.send(ViewCommand::Interrupt)
    }

    /// # Errors
    /// Returns error if the driver has stopped.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.send(ViewCommand::Shutdown)
    }
}

pub struct SessionDriver<R, O> {
    view: ClientSessionView<R, O, TokioScheduler, SystemClock>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    ticks: mpsc::UnboundedReceiver<TimerId>,
    commands: mpsc::UnboundedReceiver<ViewCommand>,
}

impl<R: Renderer, O: Outbound> SessionDriver<R, O> {
    /// Build a driver over a transport's outbound sink and incoming queue.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(
        renderer: R,
        outbound: O,
        incoming: mpsc::UnboundedReceiver<Incoming>,
        config: ViewConfig,
    ) -> (Self, DriverHandle) {
        let (scheduler, ticks) = TokioScheduler::new();
        let (tx, commands) = mpsc::unbounded_channel();
        let view = ClientSessionView::new(renderer, outbound, scheduler, SystemClock, config);
        (
            Self {
                view,
                incoming,
                ticks,
                commands,
            },
            DriverHandle { tx },
        )
    }

    #[must_use]
    pub const fn view(&self) -> &ClientSessionView<R, O, TokioScheduler, SystemClock> {
        &self.view
    }

    /// Run until shut down or until the transport closes. Returns the
    /// renderer after leaving the session.
    pub async fn run(mut self) -> R {
        loop {
            tokio::select! {
                biased;
                incoming = self.incoming.recv() => match incoming {
                    Some(Incoming::Message(message)) => self.view.handle_message(message),
                    Some(Incoming::Signal(signal)) => self.view.handle_signal(signal),
                    None => {
                        self.view.handle_signal(TransportSignal::Disconnected {
                            reason: "transport closed".into(),
                        });
                        break;
                    }
                },
                Some(timer) = self.ticks.recv() => self.view.on_tick(timer),
                command = self.commands.recv() => match command {
                    Some(ViewCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
            }
        }
        info!("session driver stopped");
        self.view.into_renderer()
    }

    fn apply(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::Join(target) => {
                if let Err(e) = self.view.request_join(target) {
                    debug!(error = %e, "join request not sent");
                }
            }
            ViewCommand::Leave => self.view.leave(),
            ViewCommand::Interrupt => {
                if let Err(e) = self.view.request_interrupt() {
                    debug!(error = %e, "interrupt request rejected");
                }
            }
            ViewCommand::SelectTask(task_id) => {
                self.view.select_task(&task_id);
            }
            ViewCommand::Shutdown => {}
        }
    }
}
