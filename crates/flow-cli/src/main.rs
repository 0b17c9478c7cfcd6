//! `stylist-flow`: operación del engine contra Postgres.
//!
//! - `create-run`: siembra un run con el pipeline bloqueado.
//! - `status`: imprime el `RunReport` como JSON.
//! - `orchestrate`: ciclos de escaneo/claim/dispatch.
//! - `work`: pool de workers sobre la cola durable.
//! - `demo`: todo en memoria con los handlers offline, sin base de datos.

mod config;
mod demo;
mod logging;
mod orchestrate;
mod worker;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use uuid::Uuid;

use flow_core::constants::DEFAULT_TRIGGER;
use flow_core::{NewRun, Orchestrator, Pipeline, RunStore, StepExecutor};
use flow_handlers::offline_registry;
use flow_handlers::registry::mismatched_handlers;
use flow_persistence::{build_dev_pool_from_env, init_dotenv, PgDispatchQueue, PgRunStore, PoolProvider};

use crate::config::{from_process_env, OrchestratorSettings, WorkerSettings};

/// Códigos de salida estables.
mod exit_codes {
    pub const NOT_FOUND: u8 = 4;
    pub const BACKEND: u8 = 5;
}

#[derive(Parser, Debug)]
#[command(name = "stylist-flow", version, about = "Run/step progression engine for the stylist pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a run for a user (the user is created on first use).
    CreateRun {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = DEFAULT_TRIGGER)]
        trigger: String,
    },
    /// Print run, steps and artifacts as JSON.
    Status { run_id: Uuid },
    /// Scan RUNNING runs and dispatch their next step.
    Orchestrate {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Consume step tasks from the durable queue.
    Work {
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        step_timeout_secs: Option<u64>,
    },
    /// Run the locked pipeline in memory with the offline handlers.
    Demo {
        #[arg(long, default_value = "demo@example.com")]
        email: String,
        #[arg(long, default_value = DEFAULT_TRIGGER)]
        trigger: String,
    },
}

type PgStore = PgRunStore<PoolProvider>;

fn pg_backend() -> Result<(PgStore, PgDispatchQueue<PoolProvider>)> {
    let pool = build_dev_pool_from_env().context("postgres pool")?;
    let provider = PoolProvider { pool };
    Ok((PgRunStore::new(provider.clone()), PgDispatchQueue::new(provider)))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::CreateRun { email, trigger } => {
            let (store, _) = pg_backend()?;
            let run_id = store.create_run(&NewRun::new(email, trigger), &Pipeline::locked())?;
            info!(%run_id, "run created");
            println!("{run_id}");
        }
        Command::Status { run_id } => {
            let (store, _) = pg_backend()?;
            let Some(report) = store.run_report(run_id)? else {
                eprintln!("run no encontrado: {run_id}");
                return Ok(ExitCode::from(exit_codes::NOT_FOUND));
            };
            print_json(&report)?;
        }
        Command::Orchestrate { once, interval_secs } => {
            let mut settings = OrchestratorSettings::from_lookup(from_process_env);
            settings.run_once |= once;
            if let Some(secs) = interval_secs {
                settings.poll_interval = std::time::Duration::from_secs(secs);
            }
            let (store, queue) = pg_backend()?;
            orchestrate::orchestrate_loop(Arc::new(Orchestrator::new(store, queue)), settings).await?;
        }
        Command::Work { concurrency, step_timeout_secs } => {
            let mut settings = WorkerSettings::from_lookup(from_process_env);
            if let Some(n) = concurrency {
                settings.concurrency = n;
            }
            if let Some(secs) = step_timeout_secs {
                settings.step_timeout = std::time::Duration::from_secs(secs);
            }
            let pipeline = Pipeline::locked();
            let handlers = offline_registry();
            let missing = handlers.missing_for(&pipeline);
            if !missing.is_empty() {
                warn!(?missing, "steps without a registered handler will fail");
            }
            let mismatched = mismatched_handlers(&pipeline);
            if !mismatched.is_empty() {
                warn!(?mismatched, "pipeline handler keys differ from the offline handlers");
            }
            let (store, queue) = pg_backend()?;
            worker::work_loop(Arc::new(StepExecutor::new(store, handlers)), queue, settings).await?;
        }
        Command::Demo { email, trigger } => {
            let report = demo::run_demo(&NewRun::new(email, trigger))?;
            print_json(&report)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_dotenv();
    logging::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_codes::BACKEND)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_run_defaults_trigger() {
        let cli = Cli::try_parse_from(["stylist-flow", "create-run", "--email", "ana@example.com"]).unwrap();
        match cli.command {
            Command::CreateRun { email, trigger } => {
                assert_eq!(email, "ana@example.com");
                assert_eq!(trigger, DEFAULT_TRIGGER);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn status_requires_a_uuid() {
        assert!(Cli::try_parse_from(["stylist-flow", "status", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["stylist-flow", "status", &id.to_string()]).unwrap();
        assert!(matches!(cli.command, Command::Status { run_id } if run_id == id));
    }

    #[test]
    fn orchestrate_flags_parse() {
        let cli = Cli::try_parse_from(["stylist-flow", "orchestrate", "--once", "--interval-secs", "9"]).unwrap();
        assert!(matches!(cli.command, Command::Orchestrate { once: true, interval_secs: Some(9) }));
    }
}
