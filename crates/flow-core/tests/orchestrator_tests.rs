use std::sync::{Arc, Barrier};
use std::thread;

use flow_core::{ClaimOutcome, Dispatcher, FlowError, InMemoryDispatcher, InMemoryRunStore, NewRun, Orchestrator,
                Pipeline, RunAdvance, RunStatus, RunStore, StepStatus, StepTask};
use uuid::Uuid;

fn seeded(pairs: &[(&'static str, &'static str)]) -> (InMemoryRunStore, Uuid) {
    let store = InMemoryRunStore::new();
    let run_id = store.create_run(&NewRun::manual("ana@example.com"), &Pipeline::from_pairs(pairs))
                      .expect("create run");
    (store, run_id)
}

fn statuses(store: &InMemoryRunStore, run_id: Uuid) -> Vec<StepStatus> {
    store.load_steps(run_id).expect("steps").iter().map(|s| s.status).collect()
}

struct FailingDispatcher;

impl Dispatcher for FailingDispatcher {
    fn enqueue(&self, _task: &StepTask) -> Result<(), FlowError> {
        Err(FlowError::Dispatch("broker unavailable".into()))
    }
}

#[test]
fn concurrent_claims_have_exactly_one_winner() {
    let (store, run_id) = seeded(&[("A", "a"), ("B", "b")]);
    let step_id = store.load_steps(run_id).unwrap()[0].id;
    let n = 8;
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n).map(|_| {
                                    let store = store.clone();
                                    let barrier = barrier.clone();
                                    thread::spawn(move || {
                                        barrier.wait();
                                        store.claim_step(step_id).expect("claim")
                                    })
                                })
                                .collect();
    let outcomes: Vec<ClaimOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| **o == ClaimOutcome::Claimed).count(), 1);
    let step = store.get_step(step_id).unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Queued);
    assert_eq!(step.attempt, 1);
}

#[test]
fn racing_orchestrators_enqueue_once() {
    let (store, run_id) = seeded(&[("A", "a"), ("B", "b")]);
    let dispatcher = InMemoryDispatcher::new();
    let n = 4;
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n).map(|_| {
                                    let orch = Orchestrator::new(store.clone(), dispatcher.clone());
                                    let barrier = barrier.clone();
                                    thread::spawn(move || {
                                        barrier.wait();
                                        orch.advance_run(run_id).expect("advance")
                                    })
                                })
                                .collect();
    let advances: Vec<RunAdvance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let dispatched = advances.iter().filter(|a| matches!(a, RunAdvance::Dispatched(_))).count();
    assert_eq!(dispatched, 1);
    assert!(advances.iter()
                    .all(|a| matches!(a, RunAdvance::Dispatched(_) | RunAdvance::ClaimConflict | RunAdvance::InFlight)));
    assert_eq!(dispatcher.sent().len(), 1);
    assert_eq!(statuses(&store, run_id), vec![StepStatus::Queued, StepStatus::Pending]);
}

#[test]
fn interleaved_cycles_do_not_dispatch_twice() {
    let (store, run_id) = seeded(&[("A", "a"), ("B", "b")]);
    let dispatcher = InMemoryDispatcher::new();
    let first = Orchestrator::new(store.clone(), dispatcher.clone());
    let second = Orchestrator::new(store.clone(), dispatcher.clone());

    let r1 = first.run_cycle().unwrap();
    let r2 = second.run_cycle().unwrap();
    assert_eq!(r1.dispatched, 1);
    assert_eq!(r2.dispatched, 0);
    assert_eq!(r2.in_flight, 1);
    assert_eq!(dispatcher.sent().len(), 1);
    assert_eq!(dispatcher.sent()[0].step_key, "A");
    assert_eq!(store.get_run(run_id).unwrap().unwrap().status, RunStatus::Running);
}

#[test]
fn in_flight_step_blocks_the_next_pending() {
    let (store, run_id) = seeded(&[("A", "a"), ("B", "b")]);
    let steps = store.load_steps(run_id).unwrap();
    store.force_step_status(steps[0].id, StepStatus::Running).unwrap();
    let orch = Orchestrator::new(store.clone(), InMemoryDispatcher::new());
    assert_eq!(orch.advance_run(run_id).unwrap(), RunAdvance::InFlight);
    assert!(orch.dispatcher().sent().is_empty());
}

#[test]
fn all_succeeded_finalizes_run() {
    let (store, run_id) = seeded(&[("A", "a"), ("B", "b")]);
    for step in store.load_steps(run_id).unwrap() {
        store.force_step_status(step.id, StepStatus::Succeeded).unwrap();
    }
    let orch = Orchestrator::new(store.clone(), InMemoryDispatcher::new());
    let report = orch.run_cycle().unwrap();
    assert_eq!(report.runs_succeeded, 1);
    let run = store.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.finished_at.is_some());
    assert!(store.running_run_ids().unwrap().is_empty());
}

#[test]
fn second_finalize_is_not_counted() {
    let (store, run_id) = seeded(&[("A", "a")]);
    let step_id = store.load_steps(run_id).unwrap()[0].id;
    store.force_step_status(step_id, StepStatus::Succeeded).unwrap();
    let first = Orchestrator::new(store.clone(), InMemoryDispatcher::new());
    let second = Orchestrator::new(store.clone(), InMemoryDispatcher::new());

    assert_eq!(first.advance_run(run_id).unwrap(), RunAdvance::Finalized(RunStatus::Succeeded));
    // Instancia con la lectura vieja: el run ya no está RUNNING.
    assert_eq!(second.advance_run(run_id).unwrap(), RunAdvance::AlreadyFinalized);
    assert_eq!(store.get_run(run_id).unwrap().unwrap().status, RunStatus::Succeeded);
}

#[test]
fn externally_failed_step_short_circuits_run() {
    let (store, run_id) = seeded(&[("A", "a"), ("B", "b"), ("C", "c")]);
    let steps = store.load_steps(run_id).unwrap();
    store.force_step_status(steps[0].id, StepStatus::Succeeded).unwrap();
    store.force_step_status(steps[1].id, StepStatus::Failed).unwrap();
    let orch = Orchestrator::new(store.clone(), InMemoryDispatcher::new());
    assert_eq!(orch.advance_run(run_id).unwrap(), RunAdvance::Finalized(RunStatus::Failed));
    assert_eq!(store.get_run(run_id).unwrap().unwrap().status, RunStatus::Failed);
    assert_eq!(statuses(&store, run_id)[2], StepStatus::Pending);
    assert!(orch.dispatcher().sent().is_empty());
}

#[test]
fn run_without_steps_is_failed() {
    let store = InMemoryRunStore::new();
    let run_id = store.create_run(&NewRun::manual("empty@example.com"), &Pipeline::new(vec![]))
                      .unwrap();
    let orch = Orchestrator::new(store.clone(), InMemoryDispatcher::new());
    let report = orch.run_cycle().unwrap();
    assert_eq!(report.runs_failed, 1);
    assert_eq!(store.get_run(run_id).unwrap().unwrap().status, RunStatus::Failed);
}

#[test]
fn failed_enqueue_releases_the_claim() {
    let (store, run_id) = seeded(&[("A", "a")]);
    let broken = Orchestrator::new(store.clone(), FailingDispatcher);
    let report = broken.run_cycle().unwrap();
    assert_eq!(report.errors, 1);
    assert_eq!(report.dispatched, 0);
    assert_eq!(statuses(&store, run_id), vec![StepStatus::Pending]);

    let dispatcher = InMemoryDispatcher::new();
    let healthy = Orchestrator::new(store.clone(), dispatcher.clone());
    assert_eq!(healthy.run_cycle().unwrap().dispatched, 1);
    assert_eq!(dispatcher.len(), 1);
    assert_eq!(store.load_steps(run_id).unwrap()[0].attempt, 2);
}

#[test]
fn terminal_runs_are_not_scanned() {
    let (store, run_id) = seeded(&[("A", "a")]);
    store.finalize_run(run_id, RunStatus::Failed).unwrap();
    let orch = Orchestrator::new(store.clone(), InMemoryDispatcher::new());
    let report = orch.run_cycle().unwrap();
    assert_eq!(report.runs_scanned, 0);
    assert_eq!(statuses(&store, run_id), vec![StepStatus::Pending]);
}
