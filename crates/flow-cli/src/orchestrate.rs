use std::sync::Arc;

use anyhow::Result;
use tokio::task::spawn_blocking;
use tokio::time::sleep;
use tracing::{info, warn};

use flow_core::{Dispatcher, Orchestrator, RunStore};

use crate::config::OrchestratorSettings;

/// Ejecuta ciclos del orchestrator hasta Ctrl-C (o uno solo con `run_once`).
///
/// Varias instancias pueden correr a la vez contra la misma base: los claims
/// condicionales garantizan un único dispatch por step.
pub async fn orchestrate_loop<S, D>(orchestrator: Arc<Orchestrator<S, D>>, settings: OrchestratorSettings) -> Result<()>
    where S: RunStore + 'static,
          D: Dispatcher + 'static
{
    info!(poll_secs = settings.poll_interval.as_secs(), run_once = settings.run_once, "orchestrator started");
    loop {
        let orch = orchestrator.clone();
        match spawn_blocking(move || orch.run_cycle()).await? {
            Ok(report) => info!(scanned = report.runs_scanned,
                                dispatched = report.dispatched,
                                succeeded = report.runs_succeeded,
                                failed = report.runs_failed,
                                conflicts = report.claim_conflicts,
                                errors = report.errors,
                                "cycle done"),
            // Un ciclo fallido (p. ej. base caída) no detiene el proceso.
            Err(e) if !settings.run_once => warn!(error = %e, "cycle failed"),
            Err(e) => return Err(e.into()),
        }
        if settings.run_once {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("orchestrator stopping");
                return Ok(());
            }
            _ = sleep(settings.poll_interval) => {}
        }
    }
}
