//! Provenance record types: the typed DAG node and its scalar fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The type of artifact a provenance record describes.
///
/// Encodes/decodes to its own variant name, matching the string stored in
/// the `provenance.type` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvenanceType {
    Document,
    OcrResult,
    Chunk,
    Embedding,
    Image,
    VlmDescription,
    Extraction,
    Clustering,
    Comparison,
    FormFill,
}

impl ProvenanceType {
    pub fn encode(&self) -> &'static str {
        match self {
            Self::Document => "DOCUMENT",
            Self::OcrResult => "OCR_RESULT",
            Self::Chunk => "CHUNK",
            Self::Embedding => "EMBEDDING",
            Self::Image => "IMAGE",
            Self::VlmDescription => "VLM_DESCRIPTION",
            Self::Extraction => "EXTRACTION",
            Self::Clustering => "CLUSTERING",
            Self::Comparison => "COMPARISON",
            Self::FormFill => "FORM_FILL",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        Some(match s {
            "DOCUMENT" => Self::Document,
            "OCR_RESULT" => Self::OcrResult,
            "CHUNK" => Self::Chunk,
            "EMBEDDING" => Self::Embedding,
            "IMAGE" => Self::Image,
            "VLM_DESCRIPTION" => Self::VlmDescription,
            "EXTRACTION" => Self::Extraction,
            "CLUSTERING" => Self::Clustering,
            "COMPARISON" => Self::Comparison,
            "FORM_FILL" => Self::FormFill,
            _ => return None,
        })
    }

    /// Whether a record of this type is permitted to root a chain (have a
    /// null `parent_id`).
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Document)
    }
}

impl fmt::Display for ProvenanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Fine-grained locator within a parent artifact: page number, char range,
/// chunk index, or bounding box. Fields are independently optional since the
/// applicable subset depends on the artifact type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub page_number: Option<i64>,
    pub char_start: Option<i64>,
    pub char_end: Option<i64>,
    pub chunk_index: Option<i64>,
    pub bbox: Option<[f64; 4]>,
}

/// An immutable node in the provenance DAG (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub id: String,
    pub r#type: ProvenanceType,
    pub source_type: String,
    pub processor: String,
    pub processor_version: String,
    pub processing_params: Value,
    pub content_hash: String,
    pub input_hash: Option<String>,
    pub file_hash: String,
    pub parent_id: Option<String>,
    pub parent_ids: Vec<String>,
    pub root_document_id: String,
    pub chain_depth: i64,
    pub chain_path: Vec<ProvenanceType>,
    pub chain_hash: String,
    pub location: Option<Location>,
    pub processing_duration_ms: Option<i64>,
    pub processing_quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Inputs the caller supplies to create a new provenance record; everything
/// derivable (parent_ids, chain_depth, chain_path, root_document_id,
/// chain_hash) is computed by the service, not accepted here.
#[derive(Clone, Debug)]
pub struct NewProvenance {
    pub r#type: ProvenanceType,
    pub source_type: String,
    pub parent_id: Option<String>,
    pub content_hash: String,
    pub processor: String,
    pub processor_version: String,
    pub processing_params: Value,
    pub location: Option<Location>,
    pub processing_duration_ms: Option<i64>,
    pub processing_quality_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_round_trips_through_encode_decode() {
        for t in [
            ProvenanceType::Document,
            ProvenanceType::OcrResult,
            ProvenanceType::Chunk,
            ProvenanceType::Embedding,
            ProvenanceType::Image,
            ProvenanceType::VlmDescription,
            ProvenanceType::Extraction,
            ProvenanceType::Clustering,
            ProvenanceType::Comparison,
            ProvenanceType::FormFill,
        ] {
            assert_eq!(ProvenanceType::decode(t.encode()), Some(t));
        }
    }

    #[test]
    fn unknown_type_decodes_to_none() {
        assert_eq!(ProvenanceType::decode("NOT_A_TYPE"), None);
    }

    #[test]
    fn only_document_is_a_valid_root() {
        assert!(ProvenanceType::Document.is_root());
        assert!(!ProvenanceType::Chunk.is_root());
    }
}
