//! # Resolve Store
//!
//! The vector store contract and its adapters.
//!
//! The engine treats the vector index as a remote collaborator: cosine
//! k-nearest-neighbor search with optional scalar-equality filters, batch
//! upsert, pagination and a count. [`VectorStore`] captures exactly that
//! surface.
//!
//! Two adapters are provided:
//!
//! - [`HttpVectorStore`] - REST adapter for a Qdrant-compatible engine
//! - [`MemoryVectorStore`] - in-process brute-force store used by tests and
//!   offline runs
//!
//! Search results carry their cosine distance (in [0, 2]) under
//! `metadata.distance`, ordered ascending. Callers treat store errors as
//! fatal for the current request; no retries happen at this layer.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use resolve_core::{EntityRecord, Result};

pub use http::HttpVectorStore;
pub use memory::MemoryVectorStore;

/// A scalar-equality filter over entity metadata, e.g.
/// `metadata.cluster_id = "ab12..."`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqFilter {
    /// Metadata key, without the `metadata.` prefix.
    pub field: String,
    pub value: String,
}

impl EqFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Contract every vector store adapter satisfies.
///
/// All operations may fail with a transport error; `get` distinguishes
/// missing entities with `Error::NotFound`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Liveness of the backing engine.
    async fn health(&self) -> Result<bool>;

    /// Idempotently create the entity collection (text fields, integer
    /// timestamps, metadata object, cosine distance, vectors supplied by the
    /// caller).
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert or replace one entity; returns the assigned id. Zero
    /// timestamps are filled in.
    async fn add(&self, entity: EntityRecord) -> Result<String>;

    /// Insert or replace a batch; returns assigned ids in input order.
    async fn batch_add(&self, entities: Vec<EntityRecord>) -> Result<Vec<String>>;

    async fn get(&self, id: &str) -> Result<EntityRecord>;

    /// Replace an existing entity, preserving its `created_at`.
    async fn update(&self, entity: EntityRecord) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn batch_update(&self, entities: Vec<EntityRecord>) -> Result<()>;

    /// Page through all entities in a stable order.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EntityRecord>>;

    async fn count(&self) -> Result<usize>;

    /// Cosine k-NN. Results are ordered by ascending distance and carry the
    /// distance under `metadata.distance`.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&EqFilter>,
    ) -> Result<Vec<EntityRecord>>;
}

/// Cosine distance (`1 - cosine similarity`) between two vectors, in [0, 2].
///
/// Mismatched or zero-magnitude vectors are treated as maximally distant.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_bounds() {
        assert!((cosine_distance(&[1.0, 0.0], &[1.0, 0.0]) - 0.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_degenerate_inputs() {
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[], &[]), 2.0);
    }
}
