use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types;
use diesel::upsert::excluded;
use log::{debug, error};
use serde_json::Value;
use uuid::Uuid;

use flow_core::model::payload_hash;
use flow_core::store::ensure_terminal;
use flow_core::{Artifact, ArtifactReader, ClaimOutcome, FlowError, NewRun, Pipeline, Run, RunReport, RunStatus,
                RunStore, Step, StepStatus};

use super::rows::{steps_from_rows, ArtifactRow, NewArtifactRow, NewRunRow, NewStepRow, RunRow, StepRow};
use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{artifacts, run_steps, runs, users};

const NON_TERMINAL: [&str; 3] = ["PENDING", "QUEUED", "RUNNING"];

/// `RunStore` sobre Postgres.
#[derive(Clone)]
pub struct PgRunStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgRunStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn load_run(&self, run_id: Uuid) -> Result<Option<Run>, PersistenceError> {
        let row: Option<RunRow> = with_retry(|| {
                                      let mut conn = self.provider.connection()?;
                                      runs::table.find(run_id)
                                                 .first::<RunRow>(&mut conn)
                                                 .optional()
                                                 .map_err(PersistenceError::from)
                                  })?;
        row.map(Run::try_from).transpose()
    }

    fn load_step_rows(&self, run_id: Uuid) -> Result<Vec<Step>, PersistenceError> {
        let rows: Vec<StepRow> = with_retry(|| {
                                     let mut conn = self.provider.connection()?;
                                     run_steps::table.filter(run_steps::run_id.eq(run_id))
                                                     .order(run_steps::step_index.asc())
                                                     .load::<StepRow>(&mut conn)
                                                     .map_err(PersistenceError::from)
                                 })?;
        steps_from_rows(rows)
    }

    /// UPDATE condicional sobre `run_steps`; devuelve filas afectadas.
    fn step_transition(&self, op: &str, step_id: Uuid, f: impl FnOnce(&mut PgConnection) -> QueryResult<usize>)
                       -> Result<bool, FlowError> {
        let mut conn = self.provider.connection()?;
        let rows = f(&mut *conn).map_err(PersistenceError::from)?;
        debug!("{op}:done step_id={step_id} rows={rows}");
        Ok(rows == 1)
    }
}

impl<P: ConnectionProvider> ArtifactReader for PgRunStore<P> {
    fn latest_artifact(&self, run_id: Uuid, kind: &str) -> Result<Option<Value>, FlowError> {
        let payload = with_retry(|| {
            let mut conn = self.provider.connection()?;
            artifacts::table.filter(artifacts::run_id.eq(run_id))
                            .filter(artifacts::kind.eq(kind))
                            .order(artifacts::seq.desc())
                            .select(artifacts::payload)
                            .first::<Value>(&mut conn)
                            .optional()
                            .map_err(PersistenceError::from)
        })?;
        Ok(payload)
    }
}

impl<P: ConnectionProvider> RunStore for PgRunStore<P> {
    fn create_run(&self, new_run: &NewRun, pipeline: &Pipeline) -> Result<Uuid, FlowError> {
        debug!("create_run:start email={} trigger={} steps={}",
               new_run.user_email,
               new_run.trigger,
               pipeline.len());
        let run_id = Uuid::new_v4();
        let hash = pipeline.hash();
        let mut conn = self.provider.connection()?;
        conn.build_transaction()
            .read_write()
            .run(|tx| {
                let user_id: Uuid = diesel::insert_into(users::table).values(users::email.eq(&new_run.user_email))
                                                                     .on_conflict(users::email)
                                                                     .do_update()
                                                                     .set(users::email.eq(excluded(users::email)))
                                                                     .returning(users::id)
                                                                     .get_result(tx)?;
                diesel::insert_into(runs::table).values(NewRunRow { id: run_id,
                                                                    user_id,
                                                                    trigger: &new_run.trigger,
                                                                    status: RunStatus::Running.as_str(),
                                                                    pipeline_hash: &hash })
                                                .execute(tx)?;
                let steps: Vec<NewStepRow> =
                    pipeline.entries()
                            .iter()
                            .enumerate()
                            .map(|(idx, entry)| NewStepRow { id: Uuid::new_v4(),
                                                             run_id,
                                                             step_index: idx as i32,
                                                             step_key: entry.step_key,
                                                             handler_key: entry.handler_key,
                                                             status: StepStatus::Pending.as_str() })
                            .collect();
                if !steps.is_empty() {
                    diesel::insert_into(run_steps::table).values(&steps).execute(tx)?;
                }
                Ok::<(), PersistenceError>(())
            })
            .map_err(|e| {
                error!("create_run:failed email={} err={e}", new_run.user_email);
                FlowError::from(e)
            })?;
        debug!("create_run:done run_id={run_id}");
        Ok(run_id)
    }

    fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, FlowError> {
        Ok(self.load_run(run_id)?)
    }

    fn running_run_ids(&self) -> Result<Vec<Uuid>, FlowError> {
        let ids = with_retry(|| {
            let mut conn = self.provider.connection()?;
            runs::table.filter(runs::status.eq(RunStatus::Running.as_str()))
                       .order(runs::created_at.asc())
                       .select(runs::id)
                       .load::<Uuid>(&mut conn)
                       .map_err(PersistenceError::from)
        })?;
        Ok(ids)
    }

    fn load_steps(&self, run_id: Uuid) -> Result<Vec<Step>, FlowError> {
        Ok(self.load_step_rows(run_id)?)
    }

    fn get_step(&self, step_id: Uuid) -> Result<Option<Step>, FlowError> {
        let row: Option<StepRow> = with_retry(|| {
                                       let mut conn = self.provider.connection()?;
                                       run_steps::table.find(step_id)
                                                       .first::<StepRow>(&mut conn)
                                                       .optional()
                                                       .map_err(PersistenceError::from)
                                   })?;
        Ok(row.map(Step::try_from).transpose()?)
    }

    fn finalize_run(&self, run_id: Uuid, status: RunStatus) -> Result<bool, FlowError> {
        ensure_terminal(status)?;
        let mut conn = self.provider.connection()?;
        let rows = diesel::update(runs::table.filter(runs::id.eq(run_id))
                                             .filter(runs::status.eq(RunStatus::Running.as_str())))
                   .set((runs::status.eq(status.as_str()), runs::finished_at.eq(Some(Utc::now()))))
                   .execute(&mut conn)
                   .map_err(PersistenceError::from)?;
        debug!("finalize_run:done run_id={run_id} status={status} rows={rows}");
        Ok(rows == 1)
    }

    fn claim_step(&self, step_id: Uuid) -> Result<ClaimOutcome, FlowError> {
        let mut conn = self.provider.connection()?;
        let rows = diesel::update(run_steps::table.filter(run_steps::id.eq(step_id))
                                                  .filter(run_steps::status.eq(StepStatus::Pending.as_str())))
                   .set((run_steps::status.eq(StepStatus::Queued.as_str()),
                         run_steps::attempt.eq(run_steps::attempt + 1)))
                   .execute(&mut conn)
                   .map_err(PersistenceError::from)?;
        debug!("claim_step:done step_id={step_id} rows={rows}");
        Ok(ClaimOutcome::from_rows(rows))
    }

    fn release_claim(&self, step_id: Uuid) -> Result<bool, FlowError> {
        self.step_transition("release_claim", step_id, |conn| {
                diesel::update(run_steps::table.filter(run_steps::id.eq(step_id))
                                               .filter(run_steps::status.eq(StepStatus::Queued.as_str())))
                .set(run_steps::status.eq(StepStatus::Pending.as_str()))
                .execute(conn)
            })
    }

    fn mark_step_running(&self, step_id: Uuid, run_id: Uuid) -> Result<bool, FlowError> {
        self.step_transition("mark_step_running", step_id, |conn| {
                diesel::sql_query("UPDATE run_steps SET status = 'RUNNING', started_at = COALESCE(started_at, now()), \
                                   error = NULL WHERE id = $1 AND run_id = $2 \
                                   AND status IN ('PENDING', 'QUEUED', 'RUNNING')")
                .bind::<sql_types::Uuid, _>(step_id)
                .bind::<sql_types::Uuid, _>(run_id)
                .execute(conn)
            })
    }

    fn complete_step(&self, step_id: Uuid, kind: &str, payload: &Value) -> Result<Option<Artifact>, FlowError> {
        debug!("complete_step:start step_id={step_id} kind={kind}");
        let hash = payload_hash(payload);
        let mut conn = self.provider.connection()?;
        let inserted: Option<ArtifactRow> =
            conn.build_transaction()
                .read_write()
                .run(|tx| {
                    let run_id: Option<Uuid> =
                        diesel::update(run_steps::table.filter(run_steps::id.eq(step_id))
                                                       .filter(run_steps::status.eq(StepStatus::Running.as_str())))
                        .set((run_steps::status.eq(StepStatus::Succeeded.as_str()),
                              run_steps::finished_at.eq(Some(Utc::now())),
                              run_steps::error.eq(None::<String>)))
                        .returning(run_steps::run_id)
                        .get_result(tx)
                        .optional()?;
                    let Some(run_id) = run_id else {
                        return Ok::<Option<ArtifactRow>, PersistenceError>(None);
                    };
                    let row = diesel::insert_into(artifacts::table).values(NewArtifactRow { run_id,
                                                                                            step_id,
                                                                                            kind,
                                                                                            payload,
                                                                                            payload_hash: &hash })
                                                                   .get_result::<ArtifactRow>(tx)?;
                    Ok(Some(row))
                })?;
        debug!("complete_step:done step_id={step_id} written={}", inserted.is_some());
        Ok(inserted.map(Artifact::from))
    }

    fn fail_step(&self, step_id: Uuid, error: &str) -> Result<bool, FlowError> {
        self.step_transition("fail_step", step_id, |conn| {
                diesel::update(run_steps::table.filter(run_steps::id.eq(step_id))
                                               .filter(run_steps::status.eq_any(NON_TERMINAL)))
                .set((run_steps::status.eq(StepStatus::Failed.as_str()),
                      run_steps::finished_at.eq(Some(Utc::now())),
                      run_steps::error.eq(Some(error))))
                .execute(conn)
            })
    }

    fn run_report(&self, run_id: Uuid) -> Result<Option<RunReport>, FlowError> {
        let Some(run) = self.load_run(run_id)? else {
            return Ok(None);
        };
        let steps = self.load_step_rows(run_id)?;
        let rows: Vec<ArtifactRow> = with_retry(|| {
                                         let mut conn = self.provider.connection()?;
                                         artifacts::table.filter(artifacts::run_id.eq(run_id))
                                                         .order(artifacts::seq.asc())
                                                         .load::<ArtifactRow>(&mut conn)
                                                         .map_err(PersistenceError::from)
                                     })?;
        Ok(Some(RunReport { run,
                            steps,
                            artifacts: rows.into_iter().map(Artifact::from).collect() }))
    }
}
