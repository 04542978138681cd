//! # Resolve
//!
//! An approximate entity-resolution engine. Given a query entity or free
//! text, Resolve returns ranked candidates that likely refer to the same
//! real-world entity, including transitively connected groups.
//!
//! The pipeline: deterministic field-aware normalization, dense-vector
//! embedding of the combined fields, canopy-style blocking to prune the
//! candidate space, cosine k-NN against a vector store, then field-aware
//! string-similarity rescoring blended under configurable weights.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resolve::prelude::*;
//!
//! # async fn example() -> resolve::Result<()> {
//! let config = Arc::new(Config::default());
//! let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new(64));
//! let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(64));
//! let service = MatchService::new(config, store, embedder);
//!
//! let mut entity = EntityData::default();
//! entity.fields.insert("name".to_string(), "Acme Inc.".to_string());
//! service.add_entity(entity).await?;
//!
//! let _matches = service
//!     .find_matches("Acme", &MatchOptions { threshold: 0.5, ..Default::default() })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate structure
//!
//! - [`resolve_core`](resolve_core) - entity model, configuration, errors
//! - [`resolve_normalize`](resolve_normalize) - deterministic normalization
//! - [`resolve_similarity`](resolve_similarity) - field-aware comparators
//! - [`resolve_embed`](resolve_embed) - embedding service client
//! - [`resolve_store`](resolve_store) - vector store contract and adapters
//! - [`resolve_match`](resolve_match) - matching pipeline, blocking, groups
//! - [`resolve_api`](resolve_api) - HTTP surface

pub use resolve_core::{
    Config, EntityData, EntityRecord, Error, Result, CLUSTER_METADATA_KEY, DEFAULT_CLUSTER_ID,
    DISTANCE_METADATA_KEY, FIELD_NAMES, HOP_DISTANCE_KEY,
};
pub use resolve_embed::{EmbeddingService, HttpEmbeddingClient, MockEmbeddingService};
pub use resolve_match::{
    ClusterService, FieldScore, GroupStrategy, MatchGroup, MatchGroupOptions, MatchOptions,
    MatchResult, MatchService, SampleField,
};
pub use resolve_normalize::Normalizer;
pub use resolve_similarity::{Comparator, Registry};
pub use resolve_store::{EqFilter, HttpVectorStore, MemoryVectorStore, VectorStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Comparator, Config, EmbeddingService, EntityData, EntityRecord, EqFilter, Error,
        GroupStrategy, HttpEmbeddingClient, HttpVectorStore, MatchGroup, MatchGroupOptions,
        MatchOptions, MatchResult, MatchService, MemoryVectorStore, MockEmbeddingService,
        Normalizer, Registry, Result, VectorStore,
    };
}
