//! Observer command handling.
//!
//! Every command ends in a broadcast so all observers, not just the sender,
//! see the resulting state.

use super::controller::RunController;
use super::supervisor::RunSupervisor;
use crate::bus::EventSink;
use crate::model::{ClientCommand, LogLevel, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CommandDispatcher {
    controller: Arc<RunController>,
    supervisor: Arc<RunSupervisor>,
    sink: Arc<dyn EventSink>,
}

impl CommandDispatcher {
    pub fn new(
        controller: Arc<RunController>,
        supervisor: Arc<RunSupervisor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            controller,
            supervisor,
            sink,
        }
    }

    /// Decode one inbound frame and dispatch it. Bad frames are dropped.
    pub fn dispatch_raw(&self, raw: &str) {
        match serde_json::from_str::<ClientCommand>(raw) {
            Ok(command) => self.dispatch(command),
            Err(e) => warn!(error = %e, "ignoring undecodable command"),
        }
    }

    pub fn dispatch(&self, command: ClientCommand) {
        debug!(command = command.name(), "dispatching command");
        match command {
            ClientCommand::Start { task } => self.start(task),
            ClientCommand::Pause => self.pause(),
            ClientCommand::Resume => self.resume(),
            ClientCommand::Stop => self.stop(),
            ClientCommand::HumanInput { message } => self.human_input(message),
        }
    }

    fn start(&self, task: String) {
        if task.trim().is_empty() {
            debug!("start without a task ignored");
            self.echo_state();
            return;
        }
        match self.controller.begin_run() {
            Ok(()) => self.supervisor.launch(task),
            Err(e) => {
                info!(error = %e, "start rejected");
                self.echo_state();
            }
        }
    }

    fn pause(&self) {
        match self.controller.pause() {
            Ok(()) => self
                .sink
                .publish(ServerEvent::log("⏸️ Paused", LogLevel::Warn)),
            Err(e) => {
                debug!(error = %e, "pause ignored");
                self.echo_state();
            }
        }
    }

    fn resume(&self) {
        match self.controller.resume() {
            Ok(()) => self
                .sink
                .publish(ServerEvent::log("▶️ Resumed", LogLevel::Info)),
            Err(e) => {
                debug!(error = %e, "resume ignored");
                self.echo_state();
            }
        }
    }

    fn stop(&self) {
        match self.controller.stop() {
            Ok(()) => self
                .sink
                .publish(ServerEvent::log("🛑 Stopping...", LogLevel::Warn)),
            Err(e) => {
                debug!(error = %e, "stop ignored");
                self.echo_state();
            }
        }
    }

    fn human_input(&self, message: String) {
        if message.is_empty() {
            self.echo_state();
            return;
        }
        self.sink
            .publish(ServerEvent::log(format!("👤 You: {message}"), LogLevel::Human));
        if !self.controller.answer(&message) {
            debug!("human input with no pending question");
        }
    }

    fn echo_state(&self) {
        self.controller.echo_state();
    }
}
