//! Chain-hash computation and verification (spec §4.1).
//!
//! `chain_hash = H(parent_chain_hash || content_hash || type || processing_params_canonical)`
//! where `parent_chain_hash` is the empty string for roots.

use crate::hash::{canonical_json, sha256_hex};
use crate::provenance::types::ProvenanceType;
use serde_json::Value;

/// Computes the chain hash for a record given its parent's chain hash (or
/// `None` for a root), its own content hash, type, and processing params.
pub fn compute_chain_hash(
    parent_chain_hash: Option<&str>,
    content_hash: &str,
    r#type: ProvenanceType,
    processing_params: &Value,
) -> String {
    let mut buf = String::new();
    buf.push_str(parent_chain_hash.unwrap_or(""));
    buf.push_str(content_hash);
    buf.push_str(r#type.encode());
    buf.push_str(&canonical_json(processing_params));
    format!("sha256:{}", sha256_hex(buf.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_hash_uses_empty_parent_segment() {
        let params = json!({});
        let with_none = compute_chain_hash(None, "sha256:abc", ProvenanceType::Document, &params);
        let with_empty = compute_chain_hash(Some(""), "sha256:abc", ProvenanceType::Document, &params);
        assert_eq!(with_none, with_empty);
    }

    #[test]
    fn hash_is_deterministic_and_sensitive_to_every_input() {
        let params = json!({"chunk_size": 500});
        let base = compute_chain_hash(Some("sha256:parent"), "sha256:content", ProvenanceType::Chunk, &params);
        assert_eq!(
            base,
            compute_chain_hash(Some("sha256:parent"), "sha256:content", ProvenanceType::Chunk, &params)
        );
        assert_ne!(
            base,
            compute_chain_hash(Some("sha256:other"), "sha256:content", ProvenanceType::Chunk, &params)
        );
        assert_ne!(
            base,
            compute_chain_hash(Some("sha256:parent"), "sha256:different", ProvenanceType::Chunk, &params)
        );
        assert_ne!(
            base,
            compute_chain_hash(Some("sha256:parent"), "sha256:content", ProvenanceType::Embedding, &params)
        );
        assert_ne!(
            base,
            compute_chain_hash(
                Some("sha256:parent"),
                "sha256:content",
                ProvenanceType::Chunk,
                &json!({"chunk_size": 600})
            )
        );
    }

    #[test]
    fn hash_is_insensitive_to_processing_params_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            compute_chain_hash(Some("sha256:p"), "sha256:c", ProvenanceType::Chunk, &a),
            compute_chain_hash(Some("sha256:p"), "sha256:c", ProvenanceType::Chunk, &b)
        );
    }
}
