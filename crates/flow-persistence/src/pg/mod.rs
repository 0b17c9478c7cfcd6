//! Implementaciones Postgres (Diesel) de los traits del core.
//!
//! - `PgRunStore`: `RunStore` con paridad 1:1 respecto a `InMemoryRunStore`.
//!   Cada transición de estado es un `UPDATE ... WHERE status = ...` cuyo
//!   conteo de filas decide el resultado; no hay locks explícitos.
//! - `PgDispatchQueue`: cola durable (`step_tasks`) con entrega al menos una
//!   vez mediante reservas con timeout de visibilidad.
//! - Las lecturas reintentan errores transitorios con backoff corto; las
//!   escrituras condicionales no se reintentan (el siguiente ciclo las
//!   vuelve a evaluar).

mod queue;
mod rows;
mod store;

pub use queue::{PgDispatchQueue, Reservation};
pub use store::PgRunStore;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

/// Pool r2d2 de conexiones Postgres. Se construye con las migraciones ya
/// aplicadas.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o uno
/// alternativo sin acoplar los stores a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`. Clonarlo comparte el pool.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Esperas entre reintentos de una lectura.
const RETRY_DELAYS_MS: [u64; 3] = [15, 30, 45];

/// Conflictos de serialización y fallas de conexión/pool; `From<DieselError>`
/// ya clasifica el resto.
fn is_retryable(e: &PersistenceError) -> bool {
    matches!(e, PersistenceError::SerializationConflict | PersistenceError::TransientIo(_))
}

/// Reintenta `f` ante errores transitorios. Sólo para lecturas: las
/// transiciones condicionales se re-evalúan en el siguiente ciclo.
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut delays = RETRY_DELAYS_MS.iter();
    loop {
        match f() {
            Err(e) if is_retryable(&e) => {
                let Some(&delay_ms) = delays.next() else {
                    return Err(e);
                };
                warn!("with_retry:retrying delay_ms={delay_ms} err={e}");
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
            }
            r => return r,
        }
    }
}

/// Construye un pool Postgres r2d2 y aplica las migraciones pendientes.
///
/// Tamaños en cero se elevan a 1 y `min > max` se recorta a `max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("build_pool:min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    debug!("build_pool:done min={final_min} max={validated_max}");
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(is_retryable(&PersistenceError::SerializationConflict));
        assert!(is_retryable(&PersistenceError::TransientIo("pool error".into())));
        assert!(!is_retryable(&PersistenceError::Unknown("deadlock detected".into())));
        assert!(!is_retryable(&PersistenceError::Corrupt("status 'DONE'".into())));
    }

    #[test]
    fn transient_read_succeeds_after_retries() {
        let mut calls = 0;
        let value = with_retry(|| {
                        calls += 1;
                        if calls < 3 {
                            Err(PersistenceError::TransientIo("connection reset".into()))
                        } else {
                            Ok(calls)
                        }
                    }).unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn retries_stop_after_three_delays() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(|| {
            calls += 1;
            Err(PersistenceError::SerializationConflict)
        });
        assert!(matches!(result, Err(PersistenceError::SerializationConflict)));
        assert_eq!(calls, 1 + RETRY_DELAYS_MS.len());
    }

    #[test]
    fn non_transient_error_is_returned_at_once() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(|| {
            calls += 1;
            Err(PersistenceError::NotFound)
        });
        assert!(matches!(result, Err(PersistenceError::NotFound)));
        assert_eq!(calls, 1);
    }
}
