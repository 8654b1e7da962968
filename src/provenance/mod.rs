//! The provenance DAG and hash chain (spec §4.1): create, fetch, traverse,
//! and verify provenance records.

pub mod chain;
pub mod service;
pub mod types;

pub use service::ProvenanceService;
pub use types::{Location, NewProvenance, ProvenanceRecord, ProvenanceType};
