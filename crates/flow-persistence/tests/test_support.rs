#![allow(dead_code)]

use flow_persistence::config::DbConfig;
use flow_persistence::pg::{build_pool, PgPool, PoolProvider};
use once_cell::sync::Lazy;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = DbConfig::from_env().ok()?;
    // 4 conexiones: suficientes para las carreras de claim de los tests.
    match build_pool(&cfg.url, 1, 4) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

pub fn with_pool<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    TEST_POOL.as_ref().map(f)
}

pub fn provider() -> Option<PoolProvider> {
    with_pool(|pool| PoolProvider { pool: pool.clone() })
}

/// E-mail único por test para no compartir usuario entre ejecuciones.
pub fn unique_email(tag: &str) -> String {
    format!("{tag}-{}@example.com", uuid::Uuid::new_v4())
}
