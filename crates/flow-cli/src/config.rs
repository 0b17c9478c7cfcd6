//! Configuración de los procesos `orchestrate` y `work`.
//!
//! Se lee del entorno (después de cargar `.env`) y los flags de la CLI pisan
//! cada valor. La lectura recibe un `lookup` para poder probarla sin tocar
//! variables de entorno del proceso.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub run_once: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub step_timeout: Duration,
    /// Tiempo que una tarea reservada queda oculta a otros workers.
    pub visibility: Duration,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

pub fn from_process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

impl OrchestratorSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self { poll_interval: Duration::from_secs(parse_or(&lookup, "ORCHESTRATOR_POLL_INTERVAL_SECONDS", 2)),
               run_once: lookup("ORCHESTRATOR_RUN_ONCE").is_some_and(|v| v.trim() == "1") }
    }
}

impl WorkerSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self { concurrency: parse_or(&lookup, "WORKER_CONCURRENCY", 4),
               poll_interval: Duration::from_millis(parse_or(&lookup, "WORKER_POLL_INTERVAL_MS", 500)),
               step_timeout: Duration::from_secs(parse_or(&lookup, "STEP_TIMEOUT_SECONDS", 300)),
               visibility: Duration::from_secs(parse_or(&lookup, "TASK_VISIBILITY_SECONDS", 600)) }
    }

    /// Una reserva que vence antes que el timeout del step provocaría una
    /// re-entrega mientras el handler original sigue corriendo.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.concurrency > 0, "WORKER_CONCURRENCY debe ser mayor que 0");
        ensure!(self.visibility > self.step_timeout,
                "TASK_VISIBILITY_SECONDS ({}s) debe superar STEP_TIMEOUT_SECONDS ({}s)",
                self.visibility.as_secs(),
                self.step_timeout.as_secs());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let orch = OrchestratorSettings::from_lookup(lookup_from(&[]));
        assert_eq!(orch.poll_interval, Duration::from_secs(2));
        assert!(!orch.run_once);

        let worker = WorkerSettings::from_lookup(lookup_from(&[]));
        assert_eq!(worker.concurrency, 4);
        assert_eq!(worker.poll_interval, Duration::from_millis(500));
        assert_eq!(worker.step_timeout, Duration::from_secs(300));
        assert_eq!(worker.visibility, Duration::from_secs(600));
        assert!(worker.validate().is_ok());
    }

    #[test]
    fn environment_values_override_defaults() {
        let lookup = lookup_from(&[("ORCHESTRATOR_RUN_ONCE", "1"),
                                   ("ORCHESTRATOR_POLL_INTERVAL_SECONDS", "7"),
                                   ("WORKER_CONCURRENCY", " 9 "),
                                   ("STEP_TIMEOUT_SECONDS", "abc")]);
        let orch = OrchestratorSettings::from_lookup(&lookup);
        assert!(orch.run_once);
        assert_eq!(orch.poll_interval, Duration::from_secs(7));
        let worker = WorkerSettings::from_lookup(&lookup);
        assert_eq!(worker.concurrency, 9);
        // Valor no numérico: se usa el default.
        assert_eq!(worker.step_timeout, Duration::from_secs(300));
    }

    #[test]
    fn visibility_must_exceed_step_timeout() {
        let worker = WorkerSettings::from_lookup(lookup_from(&[("STEP_TIMEOUT_SECONDS", "600"),
                                                               ("TASK_VISIBILITY_SECONDS", "600")]));
        let err = worker.validate().unwrap_err().to_string();
        assert!(err.contains("TASK_VISIBILITY_SECONDS"));
    }
}
