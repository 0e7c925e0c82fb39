//! Run state controller.
//!
//! Owns the run state machine, the findings log and the human question slot,
//! and exposes the cooperative callbacks the worker uses while it runs.

use crate::bus::EventSink;
use crate::error::ControlError;
use crate::model::{Finding, LogLevel, RunState, ServerEvent, StateEcho};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Answer handed to the worker when nobody replies in time.
pub const HUMAN_FALLBACK: &str = "No response - continue with best judgment";

/// The question currently waiting on a human.
struct PendingQuestion {
    id: u64,
    question: String,
    created_at: OffsetDateTime,
    reply: oneshot::Sender<String>,
}

/// Read-only view of the pending question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub question: String,
    pub created_at: OffsetDateTime,
}

#[derive(Default)]
struct RunInner {
    state: RunState,
    findings: Vec<Finding>,
    pending: Option<PendingQuestion>,
    question_seq: u64,
}

pub struct RunController {
    inner: Mutex<RunInner>,
    // Mirrors `inner.state`; only written while `inner` is locked.
    state_tx: watch::Sender<RunState>,
    // Held across a state change and its echo so echoes reach observers in
    // transition order. Never taken while `inner` or the bus is locked.
    echo_order: Mutex<()>,
    // Serializes ask_human callers so at most one question is posted.
    question_gate: tokio::sync::Mutex<()>,
    sink: Arc<dyn EventSink>,
    human_timeout: Duration,
}

impl RunController {
    pub fn new(sink: Arc<dyn EventSink>, human_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            inner: Mutex::new(RunInner::default()),
            state_tx,
            echo_order: Mutex::new(()),
            question_gate: tokio::sync::Mutex::new(()),
            sink,
            human_timeout,
        }
    }

    fn set_state(&self, inner: &mut RunInner, next: RunState) {
        let prev = inner.state;
        inner.state = next;
        self.state_tx.send_replace(next);
        debug!(from = %prev, to = %next, "run state changed");
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.inner.lock().findings.clone()
    }

    pub fn pending_question(&self) -> Option<QuestionView> {
        self.inner.lock().pending.as_ref().map(|p| QuestionView {
            question: p.question.clone(),
            created_at: p.created_at,
        })
    }

    /// Full state for late joiners.
    pub fn snapshot(&self) -> StateEcho {
        let inner = self.inner.lock();
        StateEcho {
            findings: Some(inner.findings.clone()),
            question: inner.pending.as_ref().map(|p| p.question.clone()),
            ..StateEcho::flags(inner.state)
        }
    }

    /// Idle -> Running. Clears the findings and any stale question, then
    /// echoes the fresh run to every observer.
    pub fn begin_run(&self) -> Result<(), ControlError> {
        let _order = self.echo_order.lock();
        {
            let mut inner = self.inner.lock();
            if inner.state != RunState::Idle {
                return Err(ControlError::AlreadyRunning(inner.state));
            }
            inner.findings.clear();
            inner.pending = None;
            self.set_state(&mut inner, RunState::Running);
        }
        self.publish_state(StateEcho {
            running: Some(true),
            paused: Some(false),
            findings: Some(Vec::new()),
            question: None,
        });
        Ok(())
    }

    pub fn pause(&self) -> Result<(), ControlError> {
        self.transition(
            "pause",
            &[RunState::Running],
            RunState::Paused,
            StateEcho {
                paused: Some(true),
                ..Default::default()
            },
        )
    }

    /// Paused -> Running, releasing a worker parked in `check_cooperation`.
    pub fn resume(&self) -> Result<(), ControlError> {
        self.transition(
            "resume",
            &[RunState::Paused],
            RunState::Running,
            StateEcho {
                paused: Some(false),
                ..Default::default()
            },
        )
    }

    /// Request a cooperative stop. A paused worker is released so it can see it.
    pub fn stop(&self) -> Result<(), ControlError> {
        self.transition(
            "stop",
            &[RunState::Running, RunState::Paused],
            RunState::Stopping,
            StateEcho::flags(RunState::Stopping),
        )
    }

    fn transition(
        &self,
        command: &'static str,
        allowed: &[RunState],
        next: RunState,
        echo: StateEcho,
    ) -> Result<(), ControlError> {
        let _order = self.echo_order.lock();
        {
            let mut inner = self.inner.lock();
            if !allowed.contains(&inner.state) {
                return Err(ControlError::InvalidTransition {
                    command,
                    state: inner.state,
                });
            }
            self.set_state(&mut inner, next);
        }
        self.publish_state(echo);
        Ok(())
    }

    /// Worker returned: back to Idle. Findings are kept for the result event.
    pub fn finish_run(&self) {
        let _order = self.echo_order.lock();
        {
            let mut inner = self.inner.lock();
            // Dropping the reply sender wakes an ask_human that is still waiting.
            inner.pending = None;
            self.set_state(&mut inner, RunState::Idle);
        }
        self.publish_state(StateEcho {
            running: Some(false),
            paused: Some(false),
            ..Default::default()
        });
    }

    /// Re-broadcast the current flags, e.g. after a rejected command.
    pub fn echo_state(&self) {
        let _order = self.echo_order.lock();
        let state = self.state();
        self.publish_state(StateEcho::flags(state));
    }

    fn publish_state(&self, echo: StateEcho) {
        self.sink.publish(ServerEvent::State(echo));
    }

    /// Deliver a human answer. Returns false when no question is pending.
    pub fn answer(&self, message: &str) -> bool {
        let pending = self.inner.lock().pending.take();
        match pending {
            Some(p) => {
                let waited = OffsetDateTime::now_utc() - p.created_at;
                debug!(
                    question_id = p.id,
                    waited_s = waited.whole_seconds(),
                    "answer delivered"
                );
                p.reply.send(message.to_string()).is_ok()
            }
            None => {
                debug!("answer with no pending question ignored");
                false
            }
        }
    }

    pub fn log(&self, message: impl Into<String>, level: LogLevel) {
        self.sink.publish(ServerEvent::log(message, level));
    }

    /// Poll point for the worker.
    ///
    /// Returns `Err(StoppedByUser)` once a stop was requested. While paused,
    /// parks until the state changes, without polling.
    pub async fn check_cooperation(&self) -> Result<(), ControlError> {
        let mut state_rx = self.state_tx.subscribe();
        let current = *state_rx.borrow_and_update();
        match current {
            RunState::Stopping => return Err(ControlError::StoppedByUser),
            RunState::Paused => {}
            RunState::Running | RunState::Idle => return Ok(()),
        }

        self.log("⏸️ Waiting to resume...", LogLevel::Warn);
        let after = match state_rx.wait_for(|s| *s != RunState::Paused).await {
            Ok(s) => *s,
            Err(_) => RunState::Stopping,
        };
        match after {
            RunState::Running => Ok(()),
            _ => Err(ControlError::StoppedByUser),
        }
    }

    /// Post a question to the observers and wait for an answer.
    ///
    /// Callers are queued: each question is posted only after the previous one
    /// was answered or timed out, and its timeout starts when it is posted.
    pub async fn ask_human(&self, question: &str) -> String {
        let _turn = self.question_gate.lock().await;

        let (reply, answer_rx) = oneshot::channel();
        let id = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, RunState::Running | RunState::Paused) {
                warn!(state = %inner.state, "ask_human outside an active run");
                return HUMAN_FALLBACK.to_string();
            }
            inner.question_seq += 1;
            let id = inner.question_seq;
            inner.pending = Some(PendingQuestion {
                id,
                question: question.to_string(),
                created_at: OffsetDateTime::now_utc(),
                reply,
            });
            id
        };

        info!(question_id = id, "waiting for human input");
        self.log(format!("🤖 NEED HELP: {question}"), LogLevel::Question);

        let answer = match tokio::time::timeout(self.human_timeout, answer_rx).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(_)) => {
                debug!(question_id = id, "question withdrawn");
                HUMAN_FALLBACK.to_string()
            }
            Err(_) => {
                info!(question_id = id, timeout = ?self.human_timeout, "no human response");
                HUMAN_FALLBACK.to_string()
            }
        };

        let mut inner = self.inner.lock();
        if inner.pending.as_ref().is_some_and(|p| p.id == id) {
            inner.pending = None;
        }
        answer
    }

    /// Append a finding, then announce it.
    pub fn report_finding(&self, finding: Finding) {
        let message = format!("📦 {} - {}", finding.title, finding.price);
        self.inner.lock().findings.push(finding);
        self.log(message, LogLevel::Finding);
    }
}
