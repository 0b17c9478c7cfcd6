//! Definición del pipeline: secuencia fija y lineal de (step key, handler key).
//!
//! Creación de runs, orchestrator y executors leen la misma constante
//! `LOCKED_PIPELINE`; el orden es la única "topología" que existe.

use serde::Serialize;
use serde_json::{json, Value};

use crate::hashing::hash_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineEntry {
    pub step_key: &'static str,
    pub handler_key: &'static str,
}

impl PipelineEntry {
    pub const fn new(step_key: &'static str, handler_key: &'static str) -> Self {
        Self { step_key, handler_key }
    }
}

/// Orden bloqueado de producción.
pub const LOCKED_PIPELINE: &[PipelineEntry] = &[PipelineEntry::new("STYLE_BRIEF", "stylist"),
                                                PipelineEntry::new("DEALS", "a2"),
                                                PipelineEntry::new("BRAND_SEARCH", "a1"),
                                                PipelineEntry::new("RANK", "ranker"),
                                                PipelineEntry::new("TRYON", "tryon"),
                                                PipelineEntry::new("CHECKOUT_DRAFT", "checkout")];

/// Pipeline concreto con el que se siembran los steps de un run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    entries: Vec<PipelineEntry>,
}

impl Pipeline {
    pub fn new(entries: Vec<PipelineEntry>) -> Self {
        Self { entries }
    }

    /// Pipeline de producción.
    pub fn locked() -> Self {
        Self::new(LOCKED_PIPELINE.to_vec())
    }

    /// Atajo para tests y demos: `Pipeline::from_pairs(&[("A", "a"), ("B", "b")])`.
    pub fn from_pairs(pairs: &[(&'static str, &'static str)]) -> Self {
        Self::new(pairs.iter().map(|(s, h)| PipelineEntry::new(s, h)).collect())
    }

    pub fn entries(&self) -> &[PipelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn step_keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.step_key).collect()
    }

    pub fn handler_for(&self, step_key: &str) -> Option<&'static str> {
        self.entries.iter().find(|e| e.step_key == step_key).map(|e| e.handler_key)
    }

    /// Step key siguiente a `step_key`; `None` mapea al primero.
    pub fn next_step_key(&self, step_key: Option<&str>) -> Option<&'static str> {
        match step_key {
            None => self.entries.first().map(|e| e.step_key),
            Some(key) => {
                let idx = self.entries.iter().position(|e| e.step_key == key)?;
                self.entries.get(idx + 1).map(|e| e.step_key)
            }
        }
    }

    fn as_json(&self) -> Value {
        json!(self.entries
                  .iter()
                  .map(|e| json!([e.step_key, e.handler_key]))
                  .collect::<Vec<_>>())
    }

    /// Hash estable de la definición (orden y claves incluidos).
    pub fn hash(&self) -> String {
        hash_value(&self.as_json())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::locked()
    }
}

/// Hash del pipeline bloqueado; es el que queda en `runs.pipeline_hash`.
pub fn pipeline_hash() -> String {
    Pipeline::locked().hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn locked_pipeline_has_unique_keys() {
        let p = Pipeline::locked();
        let keys: HashSet<_> = p.step_keys().into_iter().collect();
        assert_eq!(keys.len(), p.len());
        assert_eq!(p.step_keys(), vec!["STYLE_BRIEF", "DEALS", "BRAND_SEARCH", "RANK", "TRYON", "CHECKOUT_DRAFT"]);
        assert_eq!(p.handler_for("RANK"), Some("ranker"));
        assert_eq!(p.handler_for("NOPE"), None);
    }

    #[test]
    fn next_step_key_walks_in_order() {
        let p = Pipeline::locked();
        assert_eq!(p.next_step_key(None), Some("STYLE_BRIEF"));
        assert_eq!(p.next_step_key(Some("DEALS")), Some("BRAND_SEARCH"));
        assert_eq!(p.next_step_key(Some("CHECKOUT_DRAFT")), None);
        assert_eq!(p.next_step_key(Some("UNKNOWN")), None);
    }

    #[test]
    fn hash_depends_on_order() {
        let ab = Pipeline::from_pairs(&[("A", "a"), ("B", "b")]);
        let ba = Pipeline::from_pairs(&[("B", "b"), ("A", "a")]);
        assert_eq!(ab.hash(), Pipeline::from_pairs(&[("A", "a"), ("B", "b")]).hash());
        assert_ne!(ab.hash(), ba.hash());
        assert_eq!(ab.hash().len(), 64);
    }
}
