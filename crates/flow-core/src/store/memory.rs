use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::{ensure_terminal, ArtifactReader, ClaimOutcome, RunStore};
use crate::errors::FlowError;
use crate::model::{payload_hash, Artifact, NewRun, Run, RunReport, RunStatus, Step, StepStatus};
use crate::pipeline::Pipeline;

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, Uuid>,
    runs: Vec<Run>,
    steps: HashMap<Uuid, Step>,
    artifacts: Vec<Artifact>,
    next_artifact_seq: i64,
}

impl MemoryState {
    fn run_mut(&mut self, run_id: Uuid) -> Option<&mut Run> {
        self.runs.iter_mut().find(|r| r.id == run_id)
    }

    fn steps_of(&self, run_id: Uuid) -> Vec<Step> {
        let mut steps: Vec<Step> = self.steps.values().filter(|s| s.run_id == run_id).cloned().collect();
        steps.sort_by_key(|s| s.step_index);
        steps
    }
}

/// Store en memoria con la misma semántica condicional que el de Postgres.
///
/// Cada operación toma un único `Mutex`, de modo que cada actualización
/// condicional es atómica. Clonar el store comparte el mismo estado, lo que
/// permite a orchestrators y executors de un test (o de `demo`) verse entre
/// sí como si fueran procesos distintos contra la misma base.
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, FlowError> {
        self.inner.lock().map_err(|_| FlowError::Storage("in-memory store poisoned".into()))
    }

    /// Fuerza el estado de un step sin pasar por las transiciones normales.
    /// Simula a un actor externo (p. ej. una cancelación manual marcando
    /// `FAILED`).
    pub fn force_step_status(&self, step_id: Uuid, status: StepStatus) -> Result<(), FlowError> {
        let mut state = self.state()?;
        let step = state.steps.get_mut(&step_id).ok_or(FlowError::UnknownStep(step_id))?;
        step.status = status;
        Ok(())
    }

    /// Todos los artifacts de un run en orden de inserción.
    pub fn artifacts_for(&self, run_id: Uuid) -> Result<Vec<Artifact>, FlowError> {
        Ok(self.state()?.artifacts.iter().filter(|a| a.run_id == run_id).cloned().collect())
    }
}

impl ArtifactReader for InMemoryRunStore {
    fn latest_artifact(&self, run_id: Uuid, kind: &str) -> Result<Option<Value>, FlowError> {
        let state = self.state()?;
        Ok(state.artifacts
                .iter()
                .filter(|a| a.run_id == run_id && a.kind == kind)
                .max_by_key(|a| a.seq)
                .map(|a| a.payload.clone()))
    }
}

impl RunStore for InMemoryRunStore {
    fn create_run(&self, new_run: &NewRun, pipeline: &Pipeline) -> Result<Uuid, FlowError> {
        let mut state = self.state()?;
        let user_id = *state.users.entry(new_run.user_email.clone()).or_insert_with(Uuid::new_v4);
        let run = Run { id: Uuid::new_v4(),
                        user_id,
                        trigger: new_run.trigger.clone(),
                        status: RunStatus::Running,
                        pipeline_hash: pipeline.hash(),
                        created_at: Utc::now(),
                        finished_at: None };
        let run_id = run.id;
        for (idx, entry) in pipeline.entries().iter().enumerate() {
            let step = Step { id: Uuid::new_v4(),
                              run_id,
                              step_index: idx as u32,
                              step_key: entry.step_key.to_string(),
                              handler_key: entry.handler_key.to_string(),
                              status: StepStatus::Pending,
                              attempt: 0,
                              started_at: None,
                              finished_at: None,
                              error: None };
            state.steps.insert(step.id, step);
        }
        state.runs.push(run);
        Ok(run_id)
    }

    fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, FlowError> {
        Ok(self.state()?.runs.iter().find(|r| r.id == run_id).cloned())
    }

    fn running_run_ids(&self) -> Result<Vec<Uuid>, FlowError> {
        let state = self.state()?;
        let mut running: Vec<&Run> = state.runs.iter().filter(|r| r.status == RunStatus::Running).collect();
        running.sort_by_key(|r| r.created_at);
        Ok(running.into_iter().map(|r| r.id).collect())
    }

    fn load_steps(&self, run_id: Uuid) -> Result<Vec<Step>, FlowError> {
        Ok(self.state()?.steps_of(run_id))
    }

    fn get_step(&self, step_id: Uuid) -> Result<Option<Step>, FlowError> {
        Ok(self.state()?.steps.get(&step_id).cloned())
    }

    fn finalize_run(&self, run_id: Uuid, status: RunStatus) -> Result<bool, FlowError> {
        ensure_terminal(status)?;
        let mut state = self.state()?;
        match state.run_mut(run_id) {
            Some(run) if run.status == RunStatus::Running => {
                run.status = status;
                run.finished_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn claim_step(&self, step_id: Uuid) -> Result<ClaimOutcome, FlowError> {
        let mut state = self.state()?;
        let rows = match state.steps.get_mut(&step_id) {
            Some(step) if step.status == StepStatus::Pending => {
                step.status = StepStatus::Queued;
                step.attempt += 1;
                1
            }
            _ => 0,
        };
        Ok(ClaimOutcome::from_rows(rows))
    }

    fn release_claim(&self, step_id: Uuid) -> Result<bool, FlowError> {
        let mut state = self.state()?;
        match state.steps.get_mut(&step_id) {
            Some(step) if step.status == StepStatus::Queued => {
                step.status = StepStatus::Pending;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn mark_step_running(&self, step_id: Uuid, run_id: Uuid) -> Result<bool, FlowError> {
        let mut state = self.state()?;
        match state.steps.get_mut(&step_id) {
            Some(step) if step.run_id == run_id && step.status.accepts_execution() => {
                step.status = StepStatus::Running;
                step.started_at.get_or_insert_with(Utc::now);
                step.error = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn complete_step(&self, step_id: Uuid, kind: &str, payload: &Value) -> Result<Option<Artifact>, FlowError> {
        let mut state = self.state()?;
        let run_id = match state.steps.get_mut(&step_id) {
            Some(step) if step.status == StepStatus::Running => {
                step.status = StepStatus::Succeeded;
                step.finished_at = Some(Utc::now());
                step.error = None;
                step.run_id
            }
            _ => return Ok(None),
        };
        state.next_artifact_seq += 1;
        let artifact = Artifact { id: Uuid::new_v4(),
                                  run_id,
                                  step_id,
                                  seq: state.next_artifact_seq,
                                  kind: kind.to_string(),
                                  payload: payload.clone(),
                                  payload_hash: payload_hash(payload),
                                  created_at: Utc::now() };
        state.artifacts.push(artifact.clone());
        Ok(Some(artifact))
    }

    fn fail_step(&self, step_id: Uuid, error: &str) -> Result<bool, FlowError> {
        let mut state = self.state()?;
        match state.steps.get_mut(&step_id) {
            Some(step) if !step.status.is_terminal() => {
                step.status = StepStatus::Failed;
                step.finished_at = Some(Utc::now());
                step.error = Some(error.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn run_report(&self, run_id: Uuid) -> Result<Option<RunReport>, FlowError> {
        let state = self.state()?;
        let Some(run) = state.runs.iter().find(|r| r.id == run_id).cloned() else {
            return Ok(None);
        };
        let steps = state.steps_of(run_id);
        let artifacts = state.artifacts.iter().filter(|a| a.run_id == run_id).cloned().collect();
        Ok(Some(RunReport { run, steps, artifacts }))
    }
}
