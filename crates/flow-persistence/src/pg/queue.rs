//! Cola durable de tareas `flow.execute_step` sobre la tabla `step_tasks`.
//!
//! Entrega al menos una vez: `reserve` oculta la fila durante el timeout de
//! visibilidad (`FOR UPDATE SKIP LOCKED`, así dos workers nunca reservan la
//! misma fila a la vez) y `ack` la borra. Una reserva sin ack vuelve a ser
//! visible y la tarea se re-entrega; el executor tolera la duplicación.

use std::time::Duration;

use diesel::prelude::*;
use diesel::sql_types;
use log::debug;
use uuid::Uuid;

use flow_core::constants::EXECUTE_STEP_TASK;
use flow_core::{Dispatcher, FlowError, StepTask};

use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::step_tasks;

/// Tarea reservada por un worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub task_id: i64,
    /// Cantidad de veces que la tarea fue reservada (1 = primera entrega).
    pub deliveries: i32,
    pub task: StepTask,
}

#[derive(QueryableByName, Debug)]
struct ReservedRow {
    #[diesel(sql_type = sql_types::BigInt)]
    id: i64,
    #[diesel(sql_type = sql_types::Uuid)]
    step_id: Uuid,
    #[diesel(sql_type = sql_types::Uuid)]
    run_id: Uuid,
    #[diesel(sql_type = sql_types::Text)]
    step_key: String,
    #[diesel(sql_type = sql_types::Integer)]
    deliveries: i32,
}

#[derive(Clone)]
pub struct PgDispatchQueue<P: ConnectionProvider> {
    pub provider: P,
    task_name: String,
}

impl<P: ConnectionProvider> PgDispatchQueue<P> {
    pub fn new(provider: P) -> Self {
        Self::with_task_name(provider, EXECUTE_STEP_TASK)
    }

    /// Cola con un nombre de tarea propio (aísla consumidores en tests).
    pub fn with_task_name(provider: P, task_name: impl Into<String>) -> Self {
        Self { provider,
               task_name: task_name.into() }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Reserva la tarea visible más antigua, o `None` si no hay ninguna.
    pub fn reserve(&self, visibility: Duration) -> Result<Option<Reservation>, PersistenceError> {
        let mut conn = self.provider.connection()?;
        let row = diesel::sql_query("UPDATE step_tasks SET reserved_until = now() + make_interval(secs => $1), \
                                     deliveries = deliveries + 1 \
                                     WHERE id = (SELECT id FROM step_tasks \
                                                 WHERE task_name = $2 \
                                                 AND (reserved_until IS NULL OR reserved_until < now()) \
                                                 ORDER BY id LIMIT 1 FOR UPDATE SKIP LOCKED) \
                                     RETURNING id, step_id, run_id, step_key, deliveries")
                  .bind::<sql_types::Double, _>(visibility.as_secs_f64())
                  .bind::<sql_types::Text, _>(self.task_name.clone())
                  .get_result::<ReservedRow>(&mut conn)
                  .optional()?;
        Ok(row.map(|r| {
                  debug!("reserve:done task_id={} step_id={} deliveries={}", r.id, r.step_id, r.deliveries);
                  Reservation { task_id: r.id,
                                deliveries: r.deliveries,
                                task: StepTask { step_id: r.step_id,
                                                 run_id: r.run_id,
                                                 step_key: r.step_key } }
              }))
    }

    /// Confirma la tarea; `false` si ya no existía.
    pub fn ack(&self, task_id: i64) -> Result<bool, PersistenceError> {
        let mut conn = self.provider.connection()?;
        let rows = diesel::delete(step_tasks::table.find(task_id)).execute(&mut conn)?;
        debug!("ack:done task_id={task_id} rows={rows}");
        Ok(rows == 1)
    }

    /// Tareas aún no confirmadas (reservadas o no).
    pub fn pending_count(&self) -> Result<i64, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            step_tasks::table.filter(step_tasks::task_name.eq(&self.task_name))
                             .count()
                             .get_result::<i64>(&mut conn)
                             .map_err(PersistenceError::from)
        })
    }
}

impl<P: ConnectionProvider> Dispatcher for PgDispatchQueue<P> {
    fn enqueue(&self, task: &StepTask) -> Result<(), FlowError> {
        let mut conn = self.provider.connection().map_err(|e| FlowError::Dispatch(e.to_string()))?;
        diesel::insert_into(step_tasks::table).values((step_tasks::task_name.eq(&self.task_name),
                                                       step_tasks::step_id.eq(task.step_id),
                                                       step_tasks::run_id.eq(task.run_id),
                                                       step_tasks::step_key.eq(&task.step_key)))
                                              .execute(&mut conn)
                                              .map_err(|e| FlowError::Dispatch(PersistenceError::from(e).to_string()))?;
        debug!("enqueue:done task={} step_id={} run_id={}",
               self.task_name,
               task.step_id,
               task.run_id);
        Ok(())
    }
}
