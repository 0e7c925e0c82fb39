//! Worker lifecycle supervision.
//!
//! Spawns the worker for an accepted start, waits for it out of band, and
//! always drives the controller back to idle with exactly one terminal event.

use super::controller::RunController;
use crate::bus::EventSink;
use crate::engine::{Worker, WorkerContext, STOPPED_SUMMARY};
use crate::error::ControlError;
use crate::model::{LogLevel, ServerEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { summary: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub task: String,
    pub outcome: RunOutcome,
    pub findings: usize,
}

pub struct RunSupervisor {
    controller: Arc<RunController>,
    sink: Arc<dyn EventSink>,
    worker: Arc<dyn Worker>,
    // Completion handle of the most recent run.
    active: Mutex<Option<JoinHandle<RunReport>>>,
}

impl RunSupervisor {
    pub fn new(
        controller: Arc<RunController>,
        sink: Arc<dyn EventSink>,
        worker: Arc<dyn Worker>,
    ) -> Self {
        Self {
            controller,
            sink,
            worker,
            active: Mutex::new(None),
        }
    }

    /// Spawn the worker for a run the controller has already accepted.
    pub fn launch(self: &Arc<Self>, task: String) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.supervise(task).await });
        if let Some(prev) = self.active.lock().replace(handle) {
            if !prev.is_finished() {
                warn!("previous run handle still live at launch");
            }
        }
    }

    async fn supervise(&self, task: String) -> RunReport {
        info!(task = %task, "run started");
        self.sink
            .publish(ServerEvent::log(format!("🚀 Starting: {task}"), LogLevel::Info));

        // The worker gets its own task so a panic surfaces as a JoinError here.
        let ctx = WorkerContext::new(Arc::clone(&self.controller));
        let worker = Arc::clone(&self.worker);
        let worker_task = task.clone();
        let joined = tokio::spawn(async move { worker.run(ctx, worker_task).await }).await;

        let outcome = match joined {
            Ok(Ok(summary)) => RunOutcome::Completed { summary },
            Ok(Err(e))
                if matches!(
                    e.downcast_ref::<ControlError>(),
                    Some(ControlError::StoppedByUser)
                ) =>
            {
                RunOutcome::Completed {
                    summary: STOPPED_SUMMARY.to_string(),
                }
            }
            Ok(Err(e)) => RunOutcome::Failed {
                error: format!("{e:#}"),
            },
            Err(join_err) if join_err.is_panic() => RunOutcome::Failed {
                error: "worker panicked".to_string(),
            },
            Err(join_err) => RunOutcome::Failed {
                error: format!("worker task failed: {join_err}"),
            },
        };

        let findings = self.controller.findings();
        match &outcome {
            RunOutcome::Completed { summary } => {
                info!(findings = findings.len(), "run completed");
                self.sink
                    .publish(ServerEvent::log("✅ Research complete!", LogLevel::Success));
                self.sink.publish(ServerEvent::Result {
                    summary: summary.clone(),
                    findings: findings.clone(),
                });
            }
            RunOutcome::Failed { error } => {
                error!(error = %error, "run failed");
                self.sink
                    .publish(ServerEvent::log(format!("❌ Error: {error}"), LogLevel::Error));
            }
        }

        // Echoes idle itself, ordered against any start that follows.
        self.controller.finish_run();

        RunReport {
            task,
            outcome,
            findings: findings.len(),
        }
    }

    /// Wait for the most recent run to finish. `None` if there is none to wait for.
    pub async fn wait(&self) -> Option<RunReport> {
        let handle = self.active.lock().take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "supervisor task failed");
                None
            }
        }
    }

    /// Ask the active run to stop and wait for it to wind down.
    pub async fn shutdown(&self) -> Option<RunReport> {
        if self.controller.stop().is_ok() {
            info!("stopping active run for shutdown");
        }
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, RunState, StateEcho};
    use crate::testing::RecordingSink;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FnWorker<F>(F);

    #[async_trait]
    impl<F, Fut> Worker for FnWorker<F>
    where
        F: Fn(WorkerContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        async fn run(&self, ctx: WorkerContext, task: String) -> anyhow::Result<String> {
            (self.0)(ctx, task).await
        }
    }

    fn supervisor(
        worker: impl Worker,
    ) -> (Arc<RunSupervisor>, Arc<RunController>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let ctl = Arc::new(RunController::new(sink.clone(), Duration::from_secs(300)));
        let sup = Arc::new(RunSupervisor::new(ctl.clone(), sink.clone(), Arc::new(worker)));
        (sup, ctl, sink)
    }

    fn last_event(sink: &RecordingSink) -> ServerEvent {
        sink.events().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn success_emits_result_then_idle() {
        let (sup, ctl, sink) = supervisor(FnWorker(|ctx: WorkerContext, task: String| async move {
            ctx.report_finding(Finding::new("Widget", "$10", "http://x", "cheap"));
            anyhow::Ok(format!("done with {task}"))
        }));
        ctl.begin_run().unwrap();
        sup.launch("find X".into());
        let report = sup.wait().await.unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                summary: "done with find X".into()
            }
        );
        assert_eq!(report.findings, 1);
        assert_eq!(ctl.state(), RunState::Idle);

        let results: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::Result { .. }))
            .collect();
        assert_eq!(results.len(), 1);
        assert!(sink.has_log(LogLevel::Info, "🚀 Starting: find X"));
        assert!(sink.has_log(LogLevel::Success, "Research complete"));
        assert_eq!(
            last_event(&sink),
            ServerEvent::State(StateEcho {
                running: Some(false),
                paused: Some(false),
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn failure_is_logged_and_resets_state() {
        let (sup, ctl, sink) = supervisor(FnWorker(|_ctx: WorkerContext, _task: String| async {
            Err::<String, _>(anyhow::anyhow!("browser crashed"))
        }));
        ctl.begin_run().unwrap();
        sup.launch("find X".into());
        let report = sup.wait().await.unwrap();

        assert!(matches!(report.outcome, RunOutcome::Failed { ref error } if error.contains("browser crashed")));
        assert_eq!(ctl.state(), RunState::Idle);
        assert!(sink.has_log(LogLevel::Error, "❌ Error: browser crashed"));
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, ServerEvent::Result { .. })));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let (sup, ctl, sink) = supervisor(FnWorker(|_ctx: WorkerContext, _task: String| async {
            if true {
                panic!("worker bug");
            }
            anyhow::Ok(String::new())
        }));
        ctl.begin_run().unwrap();
        sup.launch("find X".into());
        let report = sup.wait().await.unwrap();

        assert!(matches!(report.outcome, RunOutcome::Failed { .. }));
        assert_eq!(ctl.state(), RunState::Idle);
        assert!(sink.has_log(LogLevel::Error, "worker panicked"));
    }

    #[tokio::test]
    async fn propagated_stop_signal_counts_as_stopped_result() {
        let (sup, ctl, sink) = supervisor(FnWorker(|ctx: WorkerContext, _task: String| async move {
            ctx.check_cooperation().await?;
            anyhow::Ok("unreachable".to_string())
        }));
        ctl.begin_run().unwrap();
        ctl.stop().unwrap();
        sup.launch("find X".into());
        let report = sup.wait().await.unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                summary: STOPPED_SUMMARY.into()
            }
        );
        assert!(!sink.has_log(LogLevel::Error, ""));
    }

    #[tokio::test]
    async fn stop_while_paused_yields_stopped_result_with_findings() {
        let (sup, ctl, sink) = supervisor(FnWorker(|ctx: WorkerContext, _task: String| async move {
            ctx.report_finding(Finding::new("Widget", "$10", "http://x", "cheap"));
            loop {
                if ctx.check_cooperation().await.is_err() {
                    return anyhow::Ok(STOPPED_SUMMARY.to_string());
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
        ctl.begin_run().unwrap();
        sup.launch("find X".into());
        while ctl.findings().is_empty() {
            tokio::task::yield_now().await;
        }
        ctl.pause().unwrap();
        while !sink.has_log(LogLevel::Warn, "Waiting to resume") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        ctl.stop().unwrap();
        sup.wait().await.unwrap();

        let result = sink
            .events()
            .into_iter()
            .find(|e| matches!(e, ServerEvent::Result { .. }))
            .unwrap();
        match result {
            ServerEvent::Result { summary, findings } => {
                assert!(summary.contains("stopped"));
                assert_eq!(findings[0].title, "Widget");
            }
            _ => unreachable!(),
        }
        assert_eq!(ctl.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn shutdown_stops_active_run() {
        let (sup, ctl, _) = supervisor(FnWorker(|ctx: WorkerContext, _task: String| async move {
            loop {
                if ctx.check_cooperation().await.is_err() {
                    return anyhow::Ok(STOPPED_SUMMARY.to_string());
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
        ctl.begin_run().unwrap();
        sup.launch("find X".into());
        let report = sup.shutdown().await.unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                summary: STOPPED_SUMMARY.into()
            }
        );
        assert!(sup.wait().await.is_none());
    }
}
