//! Contrato de los Step Handlers.
//!
//! Un handler es una función de (run, artifacts previos) -> payload. No
//! modifica runs ni steps (eso es exclusivo del executor) y debe tolerar ser
//! invocado más de una vez para el mismo step, porque el pool entrega al
//! menos una vez.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Run, Step};
use crate::pipeline::Pipeline;
use crate::store::ArtifactReader;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("missing artifact '{0}'")] MissingArtifact(String),
    #[error("upstream failure: {0}")] Upstream(String),
    #[error("timed out after {0:?}")] Timeout(Duration),
    #[error("invalid input: {0}")] InvalidInput(String),
    #[error("no handler registered for step '{0}'")] UnknownStep(String),
    #[error("handler panicked: {0}")] Panicked(String),
    #[error("artifact lookup failed: {0}")] Storage(String),
}

/// Lo que un handler puede ver durante una ejecución.
pub struct HandlerContext<'a> {
    run: &'a Run,
    step: &'a Step,
    artifacts: &'a dyn ArtifactReader,
}

impl<'a> HandlerContext<'a> {
    pub fn new(run: &'a Run, step: &'a Step, artifacts: &'a dyn ArtifactReader) -> Self {
        Self { run, step, artifacts }
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn run(&self) -> &Run {
        self.run
    }

    pub fn step(&self) -> &Step {
        self.step
    }

    /// Payload del artifact más reciente de `kind` para este run.
    pub fn artifact(&self, kind: &str) -> Result<Option<Value>, HandlerError> {
        self.artifacts
            .latest_artifact(self.run.id, kind)
            .map_err(|e| HandlerError::Storage(e.to_string()))
    }

    /// Como `artifact`, pero la ausencia es un error del handler.
    pub fn require_artifact(&self, kind: &str) -> Result<Value, HandlerError> {
        self.artifact(kind)?.ok_or_else(|| HandlerError::MissingArtifact(kind.to_string()))
    }
}

pub trait StepHandler: Send + Sync {
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError>;
}

impl<F> StepHandler for F where F: Fn(&HandlerContext<'_>) -> Result<Value, HandlerError> + Send + Sync
{
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        self(ctx)
    }
}

/// Handlers indexados por step key, en orden de registro.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn StepHandler>>,
    order: Vec<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza) el handler de `step_key`.
    pub fn insert(&mut self, step_key: impl Into<String>, handler: impl StepHandler + 'static) {
        let key = step_key.into();
        if self.handlers.insert(key.clone(), Box::new(handler)).is_none() {
            self.order.push(key);
        }
    }

    /// Variante encadenable de `insert`.
    pub fn with(mut self, step_key: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        self.insert(step_key, handler);
        self
    }

    pub fn get(&self, step_key: &str) -> Option<&dyn StepHandler> {
        self.handlers.get(step_key).map(|h| h.as_ref())
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Step keys del pipeline sin handler registrado.
    pub fn missing_for(&self, pipeline: &Pipeline) -> Vec<&'static str> {
        pipeline.step_keys().into_iter().filter(|k| !self.handlers.contains_key(*k)).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").field("keys", &self.order).finish()
    }
}
