//! # Resolve Core
//!
//! Shared foundations for the Resolve entity-resolution engine:
//!
//! - [`EntityRecord`] / [`EntityData`] - the entity model with its closed
//!   field enumeration and `_normalized` twins
//! - [`Config`] - YAML + environment configuration with validated defaults
//! - [`Error`] / [`Result`] - the error taxonomy shared by every component

pub mod config;
pub mod entity;
pub mod error;

pub use config::{
    ApiConfig, ClusteringConfig, Config, EmbeddingConfig, MatchingConfig, NormalizationConfig,
    VectorStoreConfig,
};
pub use entity::{
    EntityData, EntityRecord, CLUSTER_METADATA_KEY, DEFAULT_CLUSTER_ID, DISTANCE_METADATA_KEY,
    FIELD_NAMES, HOP_DISTANCE_KEY,
};
pub use error::{Error, Result};
