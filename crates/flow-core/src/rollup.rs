//! Rollup puro de los estados de los steps de un run.
//!
//! El orchestrator nunca guarda progreso en memoria: en cada ciclo vuelve a
//! derivar la decisión desde los steps persistidos llamando a `rollup`.

use crate::model::{RunStatus, Step, StepStatus};

/// Motivo por el que un run pasa a `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// El run existe sin steps (invariante de creación rota).
    NoSteps,
    /// Primer step fallido en orden de índice.
    StepFailed { step_index: u32, step_key: String },
}

/// Decisión del ciclo para un run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollup<'a> {
    Fail(FailReason),
    Succeed,
    /// Primer `PENDING` sin nada en vuelo antes que él.
    Dispatch(&'a Step),
    /// Hay un step `QUEUED`/`RUNNING` antes del primer `PENDING`.
    InFlight(&'a Step),
    /// Nada que hacer (no debería ocurrir con los cinco estados conocidos).
    Idle,
}

/// `steps` debe venir ordenado por `step_index`.
pub fn rollup(steps: &[Step]) -> Rollup<'_> {
    if steps.is_empty() {
        return Rollup::Fail(FailReason::NoSteps);
    }
    if let Some(failed) = steps.iter().find(|s| s.status == StepStatus::Failed) {
        return Rollup::Fail(FailReason::StepFailed { step_index: failed.step_index,
                                                     step_key: failed.step_key.clone() });
    }
    if steps.iter().all(|s| s.status == StepStatus::Succeeded) {
        return Rollup::Succeed;
    }
    for step in steps {
        if step.status == StepStatus::Pending {
            return Rollup::Dispatch(step);
        }
        if step.status.is_in_flight() {
            return Rollup::InFlight(step);
        }
    }
    Rollup::Idle
}

/// Proyección pura del estado del run a partir de sus steps.
///
/// `SUCCEEDED` sii todos los steps tuvieron éxito; `FAILED` sii alguno falló
/// (o no hay steps); `RUNNING` en cualquier otro caso.
pub fn derive_run_status(steps: &[Step]) -> RunStatus {
    match rollup(steps) {
        Rollup::Fail(_) => RunStatus::Failed,
        Rollup::Succeed => RunStatus::Succeeded,
        _ => RunStatus::Running,
    }
}

/// Cantidad de steps en vuelo; la invariante de secuencialidad exige <= 1.
pub fn in_flight_count(steps: &[Step]) -> usize {
    steps.iter().filter(|s| s.status.is_in_flight()).count()
}
