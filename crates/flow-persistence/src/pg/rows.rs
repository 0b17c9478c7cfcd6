//! Filas Diesel y su conversión a los modelos del core.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use flow_core::{Artifact, Run, RunStatus, Step, StepStatus};

use crate::error::PersistenceError;
use crate::schema::{artifacts, run_steps, runs};

#[derive(Queryable, Debug)]
pub struct RunRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trigger: String,
    pub status: String,
    pub pipeline_hash: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for Run {
    type Error = PersistenceError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row.status.parse().map_err(|e| PersistenceError::Corrupt(format!("run {}: {e}", row.id)))?;
        Ok(Run { id: row.id,
                 user_id: row.user_id,
                 trigger: row.trigger,
                 status,
                 pipeline_hash: row.pipeline_hash,
                 created_at: row.created_at,
                 finished_at: row.finished_at })
    }
}

#[derive(Queryable, Debug)]
pub struct StepRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_index: i32,
    pub step_key: String,
    pub handler_key: String,
    pub status: String,
    pub attempt: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TryFrom<StepRow> for Step {
    type Error = PersistenceError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let corrupt = |what: String| PersistenceError::Corrupt(format!("step {}: {what}", row.id));
        let status: StepStatus = row.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let step_index = u32::try_from(row.step_index).map_err(|_| corrupt(format!("step_index {}", row.step_index)))?;
        let attempt = u32::try_from(row.attempt).map_err(|_| corrupt(format!("attempt {}", row.attempt)))?;
        Ok(Step { id: row.id,
                  run_id: row.run_id,
                  step_index,
                  step_key: row.step_key,
                  handler_key: row.handler_key,
                  status,
                  attempt,
                  started_at: row.started_at,
                  finished_at: row.finished_at,
                  error: row.error })
    }
}

#[derive(Queryable, Debug)]
pub struct ArtifactRow {
    pub id: Uuid,
    pub seq: i64,
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub payload_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact { id: row.id,
                   run_id: row.run_id,
                   step_id: row.step_id,
                   seq: row.seq,
                   kind: row.kind,
                   payload: row.payload,
                   payload_hash: row.payload_hash,
                   created_at: row.created_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = runs)]
pub struct NewRunRow<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trigger: &'a str,
    pub status: &'a str,
    pub pipeline_hash: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = run_steps)]
pub struct NewStepRow<'a> {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_index: i32,
    pub step_key: &'a str,
    pub handler_key: &'a str,
    pub status: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = artifacts)]
pub struct NewArtifactRow<'a> {
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub kind: &'a str,
    pub payload: &'a Value,
    pub payload_hash: &'a str,
}

pub fn steps_from_rows(rows: Vec<StepRow>) -> Result<Vec<Step>, PersistenceError> {
    rows.into_iter().map(Step::try_from).collect()
}
