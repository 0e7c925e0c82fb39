//! Scripted worker.
//!
//! Replays a JSON list of steps through the worker callback surface. Stands in
//! for the browser-driving research agent so the coordinator can be exercised
//! end to end.

use super::{Worker, WorkerContext, STOPPED_SUMMARY};
use crate::model::{Finding, LogLevel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Log {
        message: String,
        #[serde(default)]
        level: LogLevel,
    },
    Wait {
        #[serde(with = "humantime_serde")]
        duration: Duration,
    },
    Ask {
        question: String,
    },
    Finding(Finding),
    Fail {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse script {}", path.display()))
    }

    /// Built-in walkthrough used when no script file is given.
    pub fn demo() -> Self {
        let log = |message: &str| Step::Log {
            message: message.to_string(),
            level: LogLevel::Info,
        };
        Self {
            steps: vec![
                log("🔎 Searching listings"),
                Step::Wait {
                    duration: Duration::from_secs(2),
                },
                log("🔤 Trying misspelled keywords"),
                Step::Finding(
                    Finding::new(
                        "Vintage Walkman WM-2",
                        "$45.00",
                        "https://www.ebay.com/itm/000000000001",
                        "Listed as 'wlkman', few watchers",
                    )
                    .with_image("https://i.ebayimg.com/images/g/demo/s-l225.jpg"),
                ),
                Step::Wait {
                    duration: Duration::from_secs(2),
                },
                Step::Ask {
                    question: "Seller has no feedback. Keep it on the list?".to_string(),
                },
                log("📈 Comparing against sold prices"),
                Step::Finding(Finding::new(
                    "Walkman lot (3 units, parts)",
                    "$30.00",
                    "https://www.ebay.com/itm/000000000002",
                    "Parts/not working bundle, one unit looks repairable",
                )),
            ],
        }
    }
}

pub struct ScriptedWorker {
    script: Script,
    step_delay: Duration,
}

impl ScriptedWorker {
    pub fn new(script: Script, step_delay: Duration) -> Self {
        Self { script, step_delay }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn run(&self, ctx: WorkerContext, task: String) -> Result<String> {
        let total = self.script.steps.len();
        let mut findings = 0usize;

        for (index, step) in self.script.steps.iter().enumerate() {
            if ctx.check_cooperation().await.is_err() {
                info!(step = index, "stop observed, winding down");
                return Ok(STOPPED_SUMMARY.to_string());
            }
            debug!(step = index, total, "executing step");

            match step {
                Step::Log { message, level } => ctx.log(message.clone(), *level),
                Step::Wait { duration } => tokio::time::sleep(*duration).await,
                Step::Ask { question } => {
                    let answer = ctx.ask_human(question).await;
                    ctx.log(format!("Guidance: {answer}"), LogLevel::Info);
                }
                Step::Finding(finding) => {
                    ctx.report_finding(finding.clone());
                    findings += 1;
                }
                Step::Fail { message } => anyhow::bail!("step {index} failed: {message}"),
            }

            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
        }

        Ok(format!(
            "Finished \"{task}\": {findings} finding(s) in {total} step(s)"
        ))
    }
}
