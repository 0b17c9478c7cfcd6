//! Hashing y canonicalización JSON.
//!
//! Se usa para fijar la identidad de la definición del pipeline
//! (`pipeline_hash`) y de cada payload de artifact (`payload_hash`).

pub mod canonical_json;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{hash_str, hash_value};
