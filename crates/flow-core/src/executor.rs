//! Step Executor: lleva un step despachado a un estado terminal.
//!
//! Contrato de `execute_step`:
//! 1. Entrada tolerante: `PENDING|QUEUED|RUNNING -> RUNNING`. Re-entregar el
//!    mismo mensaje re-estampa `RUNNING` en vez de fallar.
//! 2. Un step ya terminal (re-entrega tras completar) se reporta tal cual,
//!    sin volver a invocar al handler.
//! 3. Éxito: `RUNNING -> SUCCEEDED` + artifact en una transacción.
//! 4. Falla del handler (error, panic, handler ausente): `FAILED` con el
//!    mensaje truncado.
//!
//! Un step cuyo run no existe es una violación de integridad y fuerza el step
//! a `FAILED`. Un mensaje que no coincide con el step persistido (otro run u
//! otro step key) también es de integridad, pero se descarta sin escribir: el
//! step real sigue su curso.
//!
//! El executor nunca propaga errores ni panics hacia quien lo llama: siempre
//! devuelve un `StepOutcome`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::dispatch::StepTask;
use crate::errors::FlowError;
use crate::handler::{HandlerContext, HandlerError, HandlerRegistry, StepHandler};
use crate::model::{artifact_kind_for, truncate_error, Run, Step, StepStatus};
use crate::store::RunStore;

/// Registro pequeño devuelto por cada ejecución.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step_id: Uuid,
    pub step_key: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `true` cuando el resultado quedó persistido (o no hay nada que
    /// persistir). Con `false` el pool debe volver a entregar la tarea.
    #[serde(skip)]
    pub settled: bool,
}

impl StepOutcome {
    fn succeeded(task: &StepTask) -> Self {
        Self { step_id: task.step_id,
               step_key: task.step_key.clone(),
               status: StepStatus::Succeeded,
               error: None,
               settled: true }
    }

    pub fn failed(task: &StepTask, error: impl Into<String>, settled: bool) -> Self {
        Self { step_id: task.step_id,
               step_key: task.step_key.clone(),
               status: StepStatus::Failed,
               error: Some(error.into()),
               settled }
    }

    fn from_step(step: &Step) -> Self {
        Self { step_id: step.id,
               step_key: step.step_key.clone(),
               status: step.status,
               error: step.error.clone(),
               settled: step.status.is_terminal() }
    }
}

enum Preparation {
    Ready { run: Run, step: Step },
    Settled(StepOutcome),
}

pub struct StepExecutor<S: RunStore> {
    store: S,
    handlers: HandlerRegistry,
}

impl<S: RunStore> StepExecutor<S> {
    pub fn new(store: S, handlers: HandlerRegistry) -> Self {
        Self { store, handlers }
    }

    pub fn execute_step(&self, task: &StepTask) -> StepOutcome {
        debug!("execute_step:start step_id={} run_id={} step_key={}",
               task.step_id,
               task.run_id,
               task.step_key);
        let outcome = match self.prepare(task) {
            Ok(Preparation::Ready { run, step }) => self.run_handler(task, &run, &step),
            Ok(Preparation::Settled(outcome)) => outcome,
            Err(e) => {
                if e.is_integrity() {
                    error!("execute_step:integrity violation step_id={} err={e}", task.step_id);
                } else {
                    warn!("execute_step:prepare failed step_id={} err={e}", task.step_id);
                }
                self.resolve_failure(task, &e.to_string())
            }
        };
        debug!("execute_step:done step_id={} status={} settled={}",
               outcome.step_id,
               outcome.status,
               outcome.settled);
        outcome
    }

    /// Marca `FAILED` un step que no llegó a resolverse (p. ej. timeout del
    /// worker). Un resultado tardío del handler ya no podrá completarlo porque
    /// `complete_step` exige `RUNNING`.
    pub fn abandon(&self, task: &StepTask, reason: &str) -> StepOutcome {
        warn!("abandon step_id={} reason={reason}", task.step_id);
        self.resolve_failure(task, reason)
    }

    fn prepare(&self, task: &StepTask) -> Result<Preparation, FlowError> {
        let Some(step) = self.store.get_step(task.step_id)? else {
            warn!("execute_step:unknown step step_id={}", task.step_id);
            let msg = FlowError::UnknownStep(task.step_id).to_string();
            return Ok(Preparation::Settled(StepOutcome::failed(task, msg, true)));
        };
        if step.status.is_terminal() {
            info!("execute_step:redelivery of terminal step step_id={} status={}",
                  step.id,
                  step.status);
            return Ok(Preparation::Settled(StepOutcome::from_step(&step)));
        }
        if step.run_id != task.run_id || step.step_key != task.step_key {
            let e = FlowError::Integrity(format!("task ({}, {}) does not match step {} ({}, {})",
                                                 task.run_id, task.step_key, step.id, step.run_id, step.step_key));
            error!("execute_step:discarding task step_id={} err={e}", task.step_id);
            return Ok(Preparation::Settled(StepOutcome::failed(task, e.to_string(), true)));
        }
        let run = self.store
                      .get_run(step.run_id)?
                      .ok_or_else(|| FlowError::Integrity(format!("step {} references missing run {}", step.id, step.run_id)))?;
        if !self.store.mark_step_running(step.id, step.run_id)? {
            // Otra entrega lo resolvió entre la lectura y el update.
            return Ok(Preparation::Settled(self.settled_from_store(task)));
        }
        let mut step = step;
        step.status = StepStatus::Running;
        Ok(Preparation::Ready { run, step })
    }

    fn run_handler(&self, task: &StepTask, run: &Run, step: &Step) -> StepOutcome {
        let produced = match self.handlers.get(&step.step_key) {
            Some(handler) => invoke(handler, &HandlerContext::new(run, step, &self.store)),
            None => Err(HandlerError::UnknownStep(step.step_key.clone())),
        };
        let payload = match produced {
            Ok(payload) => payload,
            Err(e) => {
                warn!("execute_step:handler failed step_id={} step_key={} err={e}",
                      step.id,
                      step.step_key);
                return self.resolve_failure(task, &e.to_string());
            }
        };
        match self.store.complete_step(step.id, &artifact_kind_for(&step.step_key), &payload) {
            Ok(Some(artifact)) => {
                info!("execute_step:succeeded step_id={} kind={} payload_hash={}",
                      step.id,
                      artifact.kind,
                      artifact.payload_hash);
                StepOutcome::succeeded(task)
            }
            Ok(None) => {
                info!("execute_step:step resolved elsewhere step_id={}", step.id);
                self.settled_from_store(task)
            }
            Err(e) => self.resolve_failure(task, &format!("persisting artifact failed: {e}")),
        }
    }

    fn resolve_failure(&self, task: &StepTask, message: &str) -> StepOutcome {
        let error_msg = truncate_error(message);
        match self.store.fail_step(task.step_id, &error_msg) {
            Ok(true) => StepOutcome::failed(task, error_msg, true),
            Ok(false) => self.settled_from_store(task),
            Err(e) => {
                error!("execute_step:could not record failure step_id={} err={e}", task.step_id);
                StepOutcome::failed(task, error_msg, false)
            }
        }
    }

    fn settled_from_store(&self, task: &StepTask) -> StepOutcome {
        match self.store.get_step(task.step_id) {
            Ok(Some(step)) => StepOutcome::from_step(&step),
            Ok(None) => StepOutcome::failed(task, FlowError::UnknownStep(task.step_id).to_string(), true),
            Err(e) => StepOutcome::failed(task, e.to_string(), false),
        }
    }
}

/// Invoca al handler convirtiendo un panic en `HandlerError::Panicked`.
fn invoke(handler: &dyn StepHandler, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
    match catch_unwind(AssertUnwindSafe(|| handler.produce(ctx))) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic.downcast_ref::<&str>()
                           .map(|s| s.to_string())
                           .or_else(|| panic.downcast_ref::<String>().cloned())
                           .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(HandlerError::Panicked(msg))
        }
    }
}
