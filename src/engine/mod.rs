//! Worker boundary.
//!
//! The research worker is opaque to the coordinator: it receives a
//! [`WorkerContext`] and is expected to call back into it to honour pause and
//! stop requests, ask for guidance, and record findings.

pub(crate) mod script;

pub use script::{Script, ScriptedWorker};

use crate::error::ControlError;
use crate::model::{Finding, LogLevel};
use crate::orchestrator::RunController;
use async_trait::async_trait;
use std::sync::Arc;

/// Summary returned when a worker winds down after a stop request.
pub const STOPPED_SUMMARY: &str = "Research stopped by user";

/// A long-running task driven by the coordinator.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Execute `task`. The returned string becomes the result summary.
    ///
    /// Implementations release their own resources before returning, on every
    /// path.
    async fn run(&self, ctx: WorkerContext, task: String) -> anyhow::Result<String>;
}

/// Callback surface handed to the worker for one run.
#[derive(Clone)]
pub struct WorkerContext {
    controller: Arc<RunController>,
}

impl WorkerContext {
    pub fn new(controller: Arc<RunController>) -> Self {
        Self { controller }
    }

    /// Call periodically. `Err(StoppedByUser)` means return now.
    pub async fn check_cooperation(&self) -> Result<(), ControlError> {
        self.controller.check_cooperation().await
    }

    pub async fn ask_human(&self, question: &str) -> String {
        self.controller.ask_human(question).await
    }

    pub fn report_finding(&self, finding: Finding) {
        self.controller.report_finding(finding);
    }

    pub fn log(&self, message: impl Into<String>, level: LogLevel) {
        self.controller.log(message, level);
    }
}
