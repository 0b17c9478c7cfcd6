//! Pool de workers sobre la cola durable.
//!
//! Cada worker reserva una tarea, corre el executor en el pool bloqueante de
//! tokio con el timeout configurado y confirma la tarea sólo si el resultado
//! quedó persistido. Sin ack la reserva vence y la tarea se re-entrega.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::{spawn_blocking, JoinSet};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use flow_core::{HandlerError, RunStore, StepExecutor, StepOutcome, StepTask};
use flow_persistence::{ConnectionProvider, PgDispatchQueue, Reservation};

use crate::config::WorkerSettings;

pub async fn work_loop<S, P>(executor: Arc<StepExecutor<S>>, queue: PgDispatchQueue<P>, settings: WorkerSettings)
                             -> Result<()>
    where S: RunStore + 'static,
          P: ConnectionProvider + Clone
{
    settings.validate()?;
    info!(concurrency = settings.concurrency,
          step_timeout_secs = settings.step_timeout.as_secs(),
          visibility_secs = settings.visibility.as_secs(),
          task = queue.task_name(),
          "worker pool started");

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut workers = JoinSet::new();
    for worker_id in 0..settings.concurrency {
        workers.spawn(worker(worker_id, executor.clone(), queue.clone(), settings.clone(), stop_rx.clone()));
    }

    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
    info!("worker pool stopping");
    let _ = stop_tx.send(true);
    while let Some(joined) = workers.join_next().await {
        joined.context("worker task")?;
    }
    Ok(())
}

async fn worker<S, P>(worker_id: usize, executor: Arc<StepExecutor<S>>, queue: PgDispatchQueue<P>,
                      settings: WorkerSettings, mut stop: watch::Receiver<bool>)
    where S: RunStore + 'static,
          P: ConnectionProvider + Clone
{
    while !*stop.borrow() {
        let q = queue.clone();
        let visibility = settings.visibility;
        let reserved = match spawn_blocking(move || q.reserve(visibility)).await {
            Ok(Ok(reserved)) => reserved,
            Ok(Err(e)) => {
                warn!(worker_id, error = %e, "reserve failed");
                None
            }
            Err(e) => {
                warn!(worker_id, error = %e, "reserve task failed");
                None
            }
        };
        match reserved {
            Some(reservation) => process(worker_id, &executor, &queue, &settings, reservation).await,
            None => {
                tokio::select! {
                    _ = stop.changed() => {}
                    _ = sleep(settings.poll_interval) => {}
                }
            }
        }
    }
    debug!(worker_id, "worker stopped");
}

async fn process<S, P>(worker_id: usize, executor: &Arc<StepExecutor<S>>, queue: &PgDispatchQueue<P>,
                       settings: &WorkerSettings, reservation: Reservation)
    where S: RunStore + 'static,
          P: ConnectionProvider + Clone
{
    let Reservation { task_id, deliveries, task } = reservation;
    if deliveries > 1 {
        info!(worker_id, task_id, deliveries, step_id = %task.step_id, "redelivered task");
    }

    let exec = executor.clone();
    let t = task.clone();
    let outcome = match timeout(settings.step_timeout, spawn_blocking(move || exec.execute_step(&t))).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => abandon(executor, &task, format!("worker task failed: {e}")).await,
        // El handler sigue en su hilo; su resultado tardío no podrá completar
        // el step ya marcado FAILED.
        Err(_) => abandon(executor, &task, HandlerError::Timeout(settings.step_timeout).to_string()).await,
    };

    info!(worker_id, step_key = %outcome.step_key, status = %outcome.status, settled = outcome.settled,
          "step processed");
    if !outcome.settled {
        warn!(worker_id, task_id, step_id = %outcome.step_id, "outcome not persisted, leaving task for redelivery");
        return;
    }
    let q = queue.clone();
    match spawn_blocking(move || q.ack(task_id)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(worker_id, task_id, error = %e, "ack failed"),
        Err(e) => warn!(worker_id, task_id, error = %e, "ack task failed"),
    }
}

async fn abandon<S>(executor: &Arc<StepExecutor<S>>, task: &StepTask, reason: String) -> StepOutcome
    where S: RunStore + 'static
{
    let exec = executor.clone();
    let t = task.clone();
    let r = reason.clone();
    match spawn_blocking(move || exec.abandon(&t, &r)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(step_id = %task.step_id, error = %e, "abandon task failed");
            StepOutcome::failed(task, reason, false)
        }
    }
}
