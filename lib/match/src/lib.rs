//! # Resolve Match
//!
//! The orchestration core of the engine. [`MatchService`] wires the
//! normalizer, embedding client, blocking service and vector store into the
//! matching pipeline:
//!
//! ```text
//! query ──> normalize ──> combined text ──> embed ──> cluster key
//!                                                        │
//!            ranked results <── blend <── rescore <── k-NN search
//! ```
//!
//! - [`MatchService::find_matches`] / [`MatchService::find_matches_for_entity`]
//!   return ranked [`MatchResult`]s with optional per-field scores
//! - [`MatchService::add_entity`] / [`MatchService::add_entities`] ingest
//! - [`MatchService::get_match_group`] resolves transitively connected
//!   groups with [`GroupStrategy`] and hop/size bounds
//! - [`ClusterService`] derives and maintains canopy blocking keys

pub mod cluster;
pub mod group;
pub mod service;

pub use cluster::ClusterService;
pub use group::{GroupStrategy, MatchGroup, MatchGroupOptions, SampleField};
pub use service::{
    combined_text, parse_query_fields, FieldScore, MatchOptions, MatchResult, MatchService,
};
