//! Contrato del store persistente.
//!
//! El store es la única fuente de verdad y el único recurso mutable
//! compartido. Orchestrator y executor se coordinan exclusivamente a través
//! de las actualizaciones condicionales de este trait:
//! - `claim_step`: `PENDING -> QUEUED` sólo si el estado actual es `PENDING`.
//! - `mark_step_running`: entrada tolerante desde `PENDING|QUEUED|RUNNING`.
//! - `complete_step`: `RUNNING -> SUCCEEDED` + inserción del artifact en la
//!   misma transacción.
//! - `fail_step`: cualquier estado no terminal -> `FAILED`.
//! - `finalize_run`: `RUNNING -> SUCCEEDED|FAILED` del run.

mod memory;

pub use memory::InMemoryRunStore;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::FlowError;
use crate::model::{Artifact, NewRun, Run, RunReport, RunStatus, Step};
use crate::pipeline::Pipeline;

/// Resultado del claim condicional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Esta instancia es dueña del dispatch.
    Claimed,
    /// Otra instancia ganó la carrera (o el step ya no está `PENDING`).
    AlreadyClaimed,
}

impl ClaimOutcome {
    pub fn from_rows(rows: usize) -> Self {
        if rows == 1 {
            Self::Claimed
        } else {
            Self::AlreadyClaimed
        }
    }
}

/// Acceso de sólo lectura a artifacts, expuesto a los handlers.
pub trait ArtifactReader {
    /// Payload del artifact más reciente de `kind` para el run, o `None`.
    fn latest_artifact(&self, run_id: Uuid, kind: &str) -> Result<Option<Value>, FlowError>;
}

pub trait RunStore: ArtifactReader + Send + Sync {
    /// Inserta atómicamente el run (`RUNNING`) y un step `PENDING` por entrada
    /// del pipeline (índice = posición). Hace upsert del usuario por e-mail.
    fn create_run(&self, new_run: &NewRun, pipeline: &Pipeline) -> Result<Uuid, FlowError>;

    fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, FlowError>;

    /// Ids de runs `RUNNING`, más antiguos primero.
    fn running_run_ids(&self) -> Result<Vec<Uuid>, FlowError>;

    /// Steps del run ordenados por `step_index`.
    fn load_steps(&self, run_id: Uuid) -> Result<Vec<Step>, FlowError>;

    fn get_step(&self, step_id: Uuid) -> Result<Option<Step>, FlowError>;

    /// Pasa el run a un estado terminal si todavía está `RUNNING`.
    /// Devuelve `false` si ya era terminal.
    fn finalize_run(&self, run_id: Uuid, status: RunStatus) -> Result<bool, FlowError>;

    /// `PENDING -> QUEUED` con `attempt + 1`.
    fn claim_step(&self, step_id: Uuid) -> Result<ClaimOutcome, FlowError>;

    /// Deshace un claim cuyo enqueue falló: `QUEUED -> PENDING`.
    fn release_claim(&self, step_id: Uuid) -> Result<bool, FlowError>;

    /// `PENDING|QUEUED|RUNNING -> RUNNING`, fija `started_at` si faltaba y
    /// limpia el error. `false` si el step ya era terminal.
    fn mark_step_running(&self, step_id: Uuid, run_id: Uuid) -> Result<bool, FlowError>;

    /// `RUNNING -> SUCCEEDED` e inserción del artifact, en una transacción.
    /// `None` si el step ya no estaba `RUNNING` (no se escribe nada).
    fn complete_step(&self, step_id: Uuid, kind: &str, payload: &Value) -> Result<Option<Artifact>, FlowError>;

    /// Estado no terminal -> `FAILED` con `error` (ya truncado).
    fn fail_step(&self, step_id: Uuid, error: &str) -> Result<bool, FlowError>;

    /// Run + steps por índice + artifacts por orden de creación.
    fn run_report(&self, run_id: Uuid) -> Result<Option<RunReport>, FlowError>;
}

/// Valida que `status` sea un estado final de run (uso de los backends).
pub fn ensure_terminal(status: RunStatus) -> Result<(), FlowError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(FlowError::InvalidStatus(format!("{status} is not a terminal run status")))
    }
}
