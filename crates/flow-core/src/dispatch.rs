//! Canal de dispatch hacia el pool de ejecución.
//!
//! El pool es externo: entrega cada `StepTask` al menos una vez y sin orden
//! entre runs. El orchestrator sólo necesita `Dispatcher::enqueue`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FlowError;
use crate::model::Step;

/// Mensaje de la tarea `flow.execute_step`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepTask {
    pub step_id: Uuid,
    pub run_id: Uuid,
    pub step_key: String,
}

impl StepTask {
    pub fn for_step(step: &Step) -> Self {
        Self { step_id: step.id,
               run_id: step.run_id,
               step_key: step.step_key.clone() }
    }
}

pub trait Dispatcher: Send + Sync {
    fn enqueue(&self, task: &StepTask) -> Result<(), FlowError>;
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<StepTask>,
    sent: Vec<StepTask>,
}

/// Cola FIFO en memoria. `sent` conserva cada enqueue para aserciones.
#[derive(Clone, Default)]
pub struct InMemoryDispatcher {
    inner: Arc<Mutex<Queue>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> Result<MutexGuard<'_, Queue>, FlowError> {
        self.inner.lock().map_err(|_| FlowError::Dispatch("in-memory queue poisoned".into()))
    }

    /// Saca la siguiente tarea (lado consumidor).
    pub fn pop(&self) -> Option<StepTask> {
        self.queue().ok()?.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue().map(|q| q.pending.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Historial completo de tareas encoladas.
    pub fn sent(&self) -> Vec<StepTask> {
        self.queue().map(|q| q.sent.clone()).unwrap_or_default()
    }
}

impl Dispatcher for InMemoryDispatcher {
    fn enqueue(&self, task: &StepTask) -> Result<(), FlowError> {
        let mut q = self.queue()?;
        q.pending.push_back(task.clone());
        q.sent.push(task.clone());
        Ok(())
    }
}
