//! Constantes compartidas por orchestrator, executor y backends.

/// Nombre estable de la tarea que transporta un `StepTask` por el canal de
/// dispatch. Productores y consumidores deben coincidir en este valor.
pub const EXECUTE_STEP_TASK: &str = "flow.execute_step";

/// Longitud máxima (en caracteres) del mensaje de error guardado en un step.
pub const MAX_STEP_ERROR_LEN: usize = 1000;

/// Trigger usado cuando el cliente no indica uno.
pub const DEFAULT_TRIGGER: &str = "manual";
