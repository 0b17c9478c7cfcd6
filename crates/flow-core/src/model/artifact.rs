//! Artifact: salida durable de un step exitoso.
//!
//! - `payload` es JSON opaco; el core no interpreta su semántica.
//! - `kind` es la step key en minúsculas.
//! - `seq` da el orden total de inserción: "el artifact de kind K de este
//!   run" es siempre el de mayor `seq`.
//! - `payload_hash` se calcula sobre el JSON canónico y permite comparar
//!   salidas de re-ejecuciones.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hashing::hash_value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub seq: i64,
    pub kind: String,
    pub payload: Value,
    pub payload_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Kind del artifact producido por `step_key`.
pub fn artifact_kind_for(step_key: &str) -> String {
    step_key.to_lowercase()
}

/// Hash canónico de un payload.
pub fn payload_hash(payload: &Value) -> String {
    hash_value(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_is_lowercased_step_key() {
        assert_eq!(artifact_kind_for("STYLE_BRIEF"), "style_brief");
        assert_eq!(artifact_kind_for("rank"), "rank");
    }

    #[test]
    fn payload_hash_ignores_key_order() {
        assert_eq!(payload_hash(&json!({"a": 1, "b": [true]})), payload_hash(&json!({"b": [true], "a": 1})));
        assert_ne!(payload_hash(&json!({"a": 1})), payload_hash(&json!({"a": 2})));
    }
}
