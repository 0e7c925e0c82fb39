//! HTTP surface: the observer WebSocket plus read-only state endpoints.

mod ws;

use crate::engine::Worker;
use crate::model::{CoordinatorConfig, Finding, RunState};
use crate::orchestrator::{Coordinator, QuestionView, RunOutcome};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long shutdown waits for the active run to honour a stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) struct AppState {
    pub coordinator: Coordinator,
    observer_seq: AtomicU64,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            observer_seq: AtomicU64::new(0),
        }
    }

    fn next_observer_id(&self) -> String {
        format!("observer-{}", self.observer_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

pub(crate) type SharedState = Arc<AppState>;

pub(crate) fn router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(ws::observer_socket))
        .route("/api/state", get(current_state))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusView {
    state: RunState,
    observers: usize,
    findings: Vec<Finding>,
    question: Option<QuestionStatus>,
}

#[derive(Debug, Serialize)]
struct QuestionStatus {
    question: String,
    asked_at: String,
}

impl From<QuestionView> for QuestionStatus {
    fn from(view: QuestionView) -> Self {
        Self {
            question: view.question,
            asked_at: view
                .created_at
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "unknown".into()),
        }
    }
}

async fn current_state(State(state): State<SharedState>) -> Json<StatusView> {
    let controller = &state.coordinator.controller;
    Json(StatusView {
        state: controller.state(),
        observers: state.coordinator.bus.connection_count(),
        findings: controller.findings(),
        question: controller.pending_question().map(QuestionStatus::from),
    })
}

/// Bind, serve until Ctrl-C, then stop the active run before exiting.
pub(crate) async fn serve(cfg: CoordinatorConfig, worker: Arc<dyn Worker>) -> Result<()> {
    let coordinator = Coordinator::new(worker, cfg.human_timeout, cfg.observer_queue);
    let state: SharedState = Arc::new(AppState::new(coordinator));

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    info!(addr = %listener.local_addr()?, "🌐 coordinator listening");

    let shutdown_state = state.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            wind_down(&shutdown_state).await;
        })
        .await
        .context("server terminated with an error")
}

async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("shutdown requested");
}

async fn wind_down(state: &AppState) {
    let stopping = state.coordinator.supervisor.shutdown();
    match tokio::time::timeout(SHUTDOWN_GRACE, stopping).await {
        Ok(Some(report)) => {
            let completed = matches!(report.outcome, RunOutcome::Completed { .. });
            info!(
                task = %report.task,
                completed,
                findings = report.findings,
                "active run wound down"
            );
        }
        Ok(None) => {}
        Err(_) => warn!(grace = ?SHUTDOWN_GRACE, "active run did not stop in time"),
    }
}
