use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for one coordinator process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub human_timeout: Duration,
    /// Outbound messages buffered per observer before it is treated as stalled.
    pub observer_queue: usize,
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub step_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopping,
}

impl RunState {
    /// True while a worker invocation exists (including paused and stopping).
    pub fn is_active(self) -> bool {
        !matches!(self, RunState::Idle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item of interest recorded by the worker during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub price: String,
    pub url: String,
    pub notes: String,
    #[serde(default)]
    pub image_url: String,
}

impl Finding {
    pub fn new(
        title: impl Into<String>,
        price: impl Into<String>,
        url: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            price: price.into(),
            url: url.into(),
            notes: notes.into(),
            image_url: String::new(),
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = image_url.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
    Question,
    Human,
    Finding,
    Success,
}

/// Partial or full state echo. Absent fields are left out of the JSON so
/// observers only update what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEcho {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl StateEcho {
    /// Running/paused flags for `state`, without findings.
    pub fn flags(state: RunState) -> Self {
        Self {
            running: Some(state.is_active()),
            paused: Some(state == RunState::Paused),
            ..Default::default()
        }
    }
}

/// Events pushed to every connected observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    State(StateEcho),
    Log { message: String, level: LogLevel },
    Result {
        summary: String,
        findings: Vec<Finding>,
    },
}

impl ServerEvent {
    pub fn log(message: impl Into<String>, level: LogLevel) -> Self {
        ServerEvent::Log {
            message: message.into(),
            level,
        }
    }

    /// Short name used in tracing output.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::State(_) => "state",
            ServerEvent::Log { .. } => "log",
            ServerEvent::Result { .. } => "result",
        }
    }
}

/// Commands sent by observers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    Start {
        #[serde(default)]
        task: String,
    },
    Pause,
    Resume,
    Stop,
    HumanInput {
        #[serde(default)]
        message: String,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Start { .. } => "start",
            ClientCommand::Pause => "pause",
            ClientCommand::Resume => "resume",
            ClientCommand::Stop => "stop",
            ClientCommand::HumanInput { .. } => "human_input",
        }
    }
}
