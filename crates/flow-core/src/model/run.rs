use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Artifact, RunStatus, Step};
use crate::constants::DEFAULT_TRIGGER;

/// Una ejecución del pipeline completo para un trigger de usuario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trigger: String,
    pub status: RunStatus,
    /// Hash de la definición del pipeline con la que se sembraron los steps.
    pub pipeline_hash: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Petición de creación de un run (la consume la capa HTTP externa).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRun {
    pub user_email: String,
    pub trigger: String,
}

impl NewRun {
    pub fn new(user_email: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self { user_email: user_email.into(),
               trigger: trigger.into() }
    }

    pub fn manual(user_email: impl Into<String>) -> Self {
        Self::new(user_email, DEFAULT_TRIGGER)
    }
}

/// Respuesta de la consulta de estado: run, steps por índice y artifacts
/// por orden de creación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run: Run,
    pub steps: Vec<Step>,
    pub artifacts: Vec<Artifact>,
}
