use crate::engine::{Script, ScriptedWorker, Worker};
use crate::model::CoordinatorConfig;
use anyhow::Result;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "research-relay",
    version,
    about = "Run-control coordinator for a human-supervised research worker"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 7860)]
    pub port: u16,

    /// How long the worker waits for a human answer before continuing alone
    #[arg(long, env = "HUMAN_TIMEOUT", default_value = "300s")]
    pub human_timeout: humantime::Duration,

    /// Outbound frames buffered per observer before it is disconnected as stalled
    #[arg(long, default_value_t = 256)]
    pub observer_queue: usize,

    /// JSON script for the built-in worker (defaults to a demo walkthrough)
    #[arg(long, env = "WORKER_SCRIPT")]
    pub script: Option<std::path::PathBuf>,

    /// Pause between scripted worker steps
    #[arg(long, default_value = "1s")]
    pub step_delay: humantime::Duration,
}

/// Build a `CoordinatorConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> CoordinatorConfig {
    CoordinatorConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
        human_timeout: Duration::from(args.human_timeout),
        observer_queue: args.observer_queue.max(1),
        script: args.script.clone(),
        step_delay: Duration::from(args.step_delay),
    }
}

fn build_worker(cfg: &CoordinatorConfig) -> Result<Arc<dyn Worker>> {
    let script = match cfg.script.as_deref() {
        Some(path) => Script::load(path)?,
        None => Script::demo(),
    };
    tracing::info!(steps = script.steps.len(), custom = cfg.script.is_some(), "worker script loaded");
    Ok(Arc::new(ScriptedWorker::new(script, cfg.step_delay)))
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let worker = build_worker(&cfg)?;
    crate::server::serve(cfg, worker).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Cli::try_parse_from(["research-relay", "--port", "7860"]).unwrap();
        let cfg = build_config(&args);
        assert_eq!(cfg.bind_addr.port(), 7860);
        assert_eq!(cfg.human_timeout, Duration::from_secs(300));
        assert_eq!(cfg.step_delay, Duration::from_secs(1));
        assert_eq!(cfg.observer_queue, 256);
        assert!(cfg.script.is_none());
    }

    #[test]
    fn parses_overrides() {
        let args = Cli::try_parse_from([
            "research-relay",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--human-timeout",
            "2m",
            "--step-delay",
            "250ms",
            "--observer-queue",
            "0",
        ])
        .unwrap();
        let cfg = build_config(&args);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.human_timeout, Duration::from_secs(120));
        assert_eq!(cfg.step_delay, Duration::from_millis(250));
        assert_eq!(cfg.observer_queue, 1);
    }

    #[test]
    fn missing_script_is_an_error() {
        let args = Cli::try_parse_from([
            "research-relay",
            "--port",
            "7860",
            "--script",
            "/nonexistent/steps.json",
        ])
        .unwrap();
        assert!(build_worker(&build_config(&args)).is_err());
    }
}
