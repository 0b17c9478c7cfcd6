//! Orchestrator: escaneo de runs `RUNNING` + claim condicional.
//!
//! No mantiene estado entre ciclos. Cada instancia vuelve a leer los steps,
//! decide con `rollup` y compite por el candidato con `claim_step`; el claim
//! condicional es lo que impide que dos instancias despachen el mismo step.

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::{Dispatcher, StepTask};
use crate::errors::FlowError;
use crate::model::RunStatus;
use crate::rollup::{rollup, FailReason, Rollup};
use crate::store::{ClaimOutcome, RunStore};

/// Resultado de avanzar un run en un ciclo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAdvance {
    /// Esta instancia pasó el run a un estado terminal.
    Finalized(RunStatus),
    /// Otra instancia finalizó el run entre la lectura y el update.
    AlreadyFinalized,
    /// Esta instancia ganó el claim y encoló la tarea.
    Dispatched(StepTask),
    /// Otra instancia ganó el claim.
    ClaimConflict,
    /// Hay un step en vuelo; nada que hacer este ciclo.
    InFlight,
    Idle,
}

/// Contadores de un ciclo completo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub runs_scanned: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub dispatched: usize,
    pub claim_conflicts: usize,
    pub in_flight: usize,
    pub errors: usize,
}

impl CycleReport {
    fn record(&mut self, advance: &RunAdvance) {
        match advance {
            RunAdvance::Finalized(RunStatus::Succeeded) => self.runs_succeeded += 1,
            RunAdvance::Finalized(_) => self.runs_failed += 1,
            RunAdvance::Dispatched(_) => self.dispatched += 1,
            RunAdvance::ClaimConflict => self.claim_conflicts += 1,
            RunAdvance::InFlight => self.in_flight += 1,
            RunAdvance::AlreadyFinalized | RunAdvance::Idle => {}
        }
    }
}

pub struct Orchestrator<S: RunStore, D: Dispatcher> {
    store: S,
    dispatcher: D,
}

impl<S: RunStore, D: Dispatcher> Orchestrator<S, D> {
    pub fn new(store: S, dispatcher: D) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Un ciclo sobre todos los runs `RUNNING`. Sólo falla si no se pudo
    /// listar los runs; un error en un run se registra y se sigue.
    pub fn run_cycle(&self) -> Result<CycleReport, FlowError> {
        let run_ids = self.store.running_run_ids()?;
        let mut report = CycleReport { runs_scanned: run_ids.len(),
                                       ..CycleReport::default() };
        for run_id in run_ids {
            match self.advance_run(run_id) {
                Ok(advance) => report.record(&advance),
                Err(e) => {
                    warn!("run_cycle:advance failed run_id={run_id} err={e}");
                    report.errors += 1;
                }
            }
        }
        debug!("run_cycle:done scanned={} dispatched={} conflicts={} succeeded={} failed={} errors={}",
               report.runs_scanned,
               report.dispatched,
               report.claim_conflicts,
               report.runs_succeeded,
               report.runs_failed,
               report.errors);
        Ok(report)
    }

    /// Aplica una vez la regla de progresión a `run_id`.
    pub fn advance_run(&self, run_id: Uuid) -> Result<RunAdvance, FlowError> {
        let steps = self.store.load_steps(run_id)?;
        match rollup(&steps) {
            Rollup::Fail(reason) => {
                match &reason {
                    FailReason::NoSteps => {
                        warn!("advance_run:{}", FlowError::Integrity(format!("run {run_id} has no steps")))
                    }
                    FailReason::StepFailed { step_index, step_key } => {
                        debug!("advance_run:step failed run_id={run_id} step_index={step_index} step_key={step_key}")
                    }
                }
                self.finalize(run_id, RunStatus::Failed)
            }
            Rollup::Succeed => self.finalize(run_id, RunStatus::Succeeded),
            Rollup::InFlight(step) => {
                debug!("advance_run:waiting run_id={run_id} step_key={} status={}",
                       step.step_key,
                       step.status);
                Ok(RunAdvance::InFlight)
            }
            Rollup::Dispatch(step) => {
                if self.store.claim_step(step.id)? == ClaimOutcome::AlreadyClaimed {
                    debug!("advance_run:claim conflict run_id={run_id} step_id={}", step.id);
                    return Ok(RunAdvance::ClaimConflict);
                }
                let task = StepTask::for_step(step);
                if let Err(e) = self.dispatcher.enqueue(&task) {
                    // Sin mensaje encolado el step quedaría QUEUED para siempre.
                    let released = self.store.release_claim(step.id)?;
                    warn!("advance_run:enqueue failed run_id={run_id} step_id={} released={released} err={e}",
                          step.id);
                    return Err(e);
                }
                info!("advance_run:dispatched run_id={run_id} step_index={} step_key={} step_id={}",
                      step.step_index,
                      step.step_key,
                      step.id);
                Ok(RunAdvance::Dispatched(task))
            }
            Rollup::Idle => Ok(RunAdvance::Idle),
        }
    }

    fn finalize(&self, run_id: Uuid, status: RunStatus) -> Result<RunAdvance, FlowError> {
        if !self.store.finalize_run(run_id, status)? {
            debug!("advance_run:already finalized run_id={run_id}");
            return Ok(RunAdvance::AlreadyFinalized);
        }
        info!("advance_run:finalized run_id={run_id} status={status}");
        Ok(RunAdvance::Finalized(status))
    }
}
