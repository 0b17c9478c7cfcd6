//! `demo`: el pipeline bloqueado de punta a punta en memoria, con los
//! handlers offline.

use anyhow::{anyhow, Result};
use tracing::info;

use flow_core::{InMemoryDispatcher, InMemoryRunStore, NewRun, Orchestrator, Pipeline, RunReport, RunStore,
                StepExecutor};
use flow_handlers::offline_registry;

pub fn run_demo(new_run: &NewRun) -> Result<RunReport> {
    let pipeline = Pipeline::locked();
    let store = InMemoryRunStore::new();
    let dispatcher = InMemoryDispatcher::new();
    let run_id = store.create_run(new_run, &pipeline)?;
    let orchestrator = Orchestrator::new(store.clone(), dispatcher.clone());
    let executor = StepExecutor::new(store.clone(), offline_registry());

    // Un ciclo por step más el que finaliza el run.
    for cycle in 0..=pipeline.len() {
        let report = orchestrator.run_cycle()?;
        info!(cycle, dispatched = report.dispatched, finalized = report.runs_succeeded + report.runs_failed,
              "demo cycle");
        while let Some(task) = dispatcher.pop() {
            let outcome = executor.execute_step(&task);
            info!(step_key = %outcome.step_key, status = %outcome.status, "demo step");
        }
    }
    store.run_report(run_id)?.ok_or_else(|| anyhow!("run {run_id} desapareció del store"))
}
