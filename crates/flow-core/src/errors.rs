//! Errores del core.
//!
//! `FlowError` cubre fallas de infraestructura (store, dispatch) y
//! violaciones de invariantes de creación (`Integrity`). Los conflictos de
//! claim NO son errores: se modelan como `ClaimOutcome::AlreadyClaimed`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FlowError {
    #[error("storage: {0}")] Storage(String),
    #[error("integrity: {0}")] Integrity(String),
    #[error("dispatch: {0}")] Dispatch(String),
    #[error("unknown step {0}")] UnknownStep(Uuid),
    #[error("invalid status value '{0}'")] InvalidStatus(String),
}

impl FlowError {
    /// Indica si el error proviene de una invariante de creación rota.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
