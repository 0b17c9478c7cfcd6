use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StepStatus;
use crate::constants::MAX_STEP_ERROR_LEN;

/// Unidad de dispatch y ejecución: una posición del pipeline dentro de un run.
///
/// `step_index` es único por run, contiguo desde cero e inmutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_index: u32,
    pub step_key: String,
    pub handler_key: String,
    pub status: StepStatus,
    /// Se incrementa en cada claim; sólo informativo (no hay retries).
    pub attempt: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Recorta un mensaje de error a `MAX_STEP_ERROR_LEN` caracteres sin partir
/// un carácter multibyte.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_STEP_ERROR_LEN) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}
