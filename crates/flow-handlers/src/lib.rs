//! flow-handlers: handlers offline (deterministas) del pipeline bloqueado.
//!
//! Cada step tiene su payload tipado en `artifacts`; los handlers leen los
//! artifacts previos del run, los deserializan y producen el suyo sin IO
//! externo. Sirven para correr el pipeline de punta a punta (`demo`, tests)
//! sin integraciones de terceros.

pub mod artifacts;
pub mod registry;
pub mod steps;

pub use registry::offline_registry;
