//! Varios orchestrators y executors compartiendo el mismo store, con
//! entregas duplicadas y fallas. Después de cada ciclo se verifican las
//! invariantes de estado de todos los runs.

use flow_core::{derive_run_status, in_flight_count, HandlerContext, HandlerError, HandlerRegistry,
                InMemoryDispatcher, InMemoryRunStore, NewRun, Orchestrator, Pipeline, RunStatus, RunStore,
                StepExecutor, StepStatus};
use serde_json::{json, Value};
use uuid::Uuid;

fn ok(ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
    Ok(json!({"step": ctx.step().step_key, "run": ctx.run_id()}))
}

fn fails_for_flaky_trigger(ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
    if ctx.run().trigger == "flaky" {
        return Err(HandlerError::Upstream("search provider timeout".into()));
    }
    ok(ctx)
}

fn registry() -> HandlerRegistry {
    HandlerRegistry::new().with("A", ok).with("B", fails_for_flaky_trigger).with("C", ok)
}

fn check_invariants(store: &InMemoryRunStore, runs: &[Uuid]) {
    for run_id in runs {
        let run = store.get_run(*run_id).unwrap().expect("run exists");
        let steps = store.load_steps(*run_id).unwrap();
        assert!(in_flight_count(&steps) <= 1, "run {run_id} has more than one step in flight");
        assert_eq!(run.status, derive_run_status(&steps), "run {run_id} status diverges from its steps");
        let indexes: Vec<u32> = steps.iter().map(|s| s.step_index).collect();
        assert_eq!(indexes, (0..steps.len() as u32).collect::<Vec<_>>());
    }
}

#[test]
fn invariants_hold_across_interleaved_cycles() {
    let store = InMemoryRunStore::new();
    let pipeline = Pipeline::from_pairs(&[("A", "a"), ("B", "b"), ("C", "c")]);
    let runs: Vec<Uuid> = (0..6).map(|i| {
                                    let trigger = if i % 3 == 0 { "flaky" } else { "manual" };
                                    store.create_run(&NewRun::new(format!("user{i}@example.com"), trigger), &pipeline)
                                         .unwrap()
                                })
                                .collect();

    let dispatcher = InMemoryDispatcher::new();
    let orchestrators: Vec<_> = (0..3).map(|_| Orchestrator::new(store.clone(), dispatcher.clone())).collect();
    let executors: Vec<_> = (0..2).map(|_| StepExecutor::new(store.clone(), registry())).collect();

    let mut tick = 0usize;
    while !store.running_run_ids().unwrap().is_empty() {
        tick += 1;
        assert!(tick < 200, "simulation did not converge");
        orchestrators[tick % orchestrators.len()].run_cycle().unwrap();
        check_invariants(&store, &runs);

        // Cada cierto número de ticks se entrega dos veces la misma tarea.
        let mut delivered = 0;
        while let Some(task) = dispatcher.pop() {
            let exec = &executors[delivered % executors.len()];
            exec.execute_step(&task);
            if tick % 4 == 0 {
                exec.execute_step(&task);
            }
            delivered += 1;
            // Deja tareas en cola entre ciclos para que otro orchestrator las
            // vea en vuelo.
            if delivered == 2 {
                break;
            }
        }
    }
    check_invariants(&store, &runs);

    for (i, run_id) in runs.iter().enumerate() {
        let report = store.run_report(*run_id).unwrap().unwrap();
        if i % 3 == 0 {
            assert_eq!(report.run.status, RunStatus::Failed);
            assert_eq!(report.steps[2].status, StepStatus::Pending);
            assert_eq!(report.artifacts.len(), 1);
        } else {
            assert_eq!(report.run.status, RunStatus::Succeeded);
            assert_eq!(report.artifacts.len(), 3);
        }
    }
    assert!(dispatcher.sent().len() >= 12);
}
