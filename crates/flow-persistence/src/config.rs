//! Configuración de conexión desde variables de entorno.
//! Convención `DATABASE_URL` más tamaños opcionales del pool.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // sin .env no es un error
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        Ok(Self { url,
                  min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2),
                  max_connections: env_or("DATABASE_MAX_CONNECTIONS", 16) })
    }
}

fn env_or(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Fuerza la carga temprana de .env (la usa el binario antes de leer su
/// propia configuración).
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
