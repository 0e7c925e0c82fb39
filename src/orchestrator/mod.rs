//! Run coordination.
//!
//! This module owns the run state machine (controller), observer command
//! handling (dispatcher) and worker lifecycle (supervisor). The transport layer
//! only talks to [`Coordinator`], which wires the three around one event bus.

mod controller;
mod dispatcher;
mod supervisor;

pub(crate) use controller::{QuestionView, RunController};
pub(crate) use dispatcher::CommandDispatcher;
pub(crate) use supervisor::{RunOutcome, RunSupervisor};

use crate::bus::{EventBus, EventSink, ObserverConnection};
use crate::engine::Worker;
use crate::model::ServerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One coordinator: a single run slot shared by every observer.
pub(crate) struct Coordinator {
    pub bus: Arc<EventBus>,
    pub controller: Arc<RunController>,
    pub dispatcher: CommandDispatcher,
    pub supervisor: Arc<RunSupervisor>,
    observer_queue: usize,
}

impl Coordinator {
    pub fn new(worker: Arc<dyn Worker>, human_timeout: Duration, observer_queue: usize) -> Self {
        let bus = Arc::new(EventBus::new());
        let sink: Arc<dyn EventSink> = bus.clone();
        let controller = Arc::new(RunController::new(sink.clone(), human_timeout));
        let supervisor = Arc::new(RunSupervisor::new(
            controller.clone(),
            sink.clone(),
            worker,
        ));
        let dispatcher = CommandDispatcher::new(controller.clone(), supervisor.clone(), sink);
        Self {
            bus,
            controller,
            dispatcher,
            supervisor,
            observer_queue,
        }
    }

    /// Register a new observer; its first frame is the full state snapshot.
    pub fn connect(&self, id: impl Into<String>) -> mpsc::Receiver<Arc<str>> {
        let (conn, rx) = ObserverConnection::new(id, self.observer_queue);
        let controller = &self.controller;
        self.bus
            .register(conn, || ServerEvent::State(controller.snapshot()));
        rx
    }

    pub fn disconnect(&self, id: &str) {
        self.bus.unregister(id);
    }
}
