//! flow-persistence
//!
//! Backend Postgres (Diesel + r2d2) del engine: `PgRunStore` implementa
//! `RunStore` con las mismas actualizaciones condicionales que el store en
//! memoria y `PgDispatchQueue` es el canal de dispatch durable.
//!
//! Módulos:
//! - `pg`: store, cola y utilidades de pool.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgDispatchQueue, PgPool, PgRunStore, PoolProvider,
             Reservation};
