//! Canopy-style blocking.
//!
//! Entities are partitioned into clusters by a cheap key derived from a
//! configured list of blocking fields. Search then filters candidates to the
//! query's cluster, pruning the space the k-NN has to rank.
//!
//! The key is a deterministic function of the normalized blocking-field
//! values: per-field components (name prefix, zip prefix, phone tail, email
//! domain) concatenated in sorted field order and hashed to 16 hex
//! characters. Equal normalized inputs always produce equal keys, which is
//! what makes stored keys reusable across restarts and re-ingestion.

use std::collections::HashMap;

use md5::{Digest, Md5};
use parking_lot::RwLock;

use resolve_core::config::ClusteringConfig;
use resolve_core::{EntityRecord, Result, CLUSTER_METADATA_KEY, DEFAULT_CLUSTER_ID};
use resolve_store::{EqFilter, VectorStore};

/// Page size for bulk cluster recomputation.
pub const RECOMPUTE_BATCH_SIZE: usize = 100;

pub struct ClusterService {
    config: ClusteringConfig,
    // Memoizes derived keys; unbounded, entries are tiny.
    key_cache: RwLock<HashMap<String, String>>,
}

impl ClusterService {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            key_cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Derive the blocking key for a field map (raw keys plus `_normalized`
    /// twins). Falls back to the raw value when the normalized twin is
    /// absent, preserving keys stored before normalization settings changed.
    pub fn generate_key(&self, fields: &HashMap<String, String>) -> String {
        if !self.config.enabled || self.config.fields.is_empty() {
            return DEFAULT_CLUSTER_ID.to_string();
        }

        // Resolve each blocking field to its normalized value, falling back
        // to the raw value, and keep only populated fields in sorted order.
        let mut blocking_values: Vec<(&str, &str)> = self
            .config
            .fields
            .iter()
            .filter_map(|field| {
                fields
                    .get(&format!("{field}_normalized"))
                    .filter(|v| !v.is_empty())
                    .or_else(|| fields.get(field).filter(|v| !v.is_empty()))
                    .map(|value| (field.as_str(), value.as_str()))
            })
            .collect();
        blocking_values.sort_by(|a, b| a.0.cmp(b.0));

        let cache_key: String = blocking_values
            .iter()
            .map(|(field, value)| format!("{field}:{value}|"))
            .collect();

        if let Some(cached) = self.key_cache.read().get(&cache_key) {
            return cached.clone();
        }

        let mut key = String::new();
        for (field, value) in &blocking_values {
            let component = Self::key_component(field, value);
            if !component.is_empty() {
                key.push_str(&component);
                key.push('|');
            }
        }

        if key.is_empty() {
            return DEFAULT_CLUSTER_ID.to_string();
        }

        let digest = Md5::digest(key.as_bytes());
        let cluster_id = format!("{digest:x}")[..16].to_string();

        self.key_cache
            .write()
            .insert(cache_key, cluster_id.clone());

        cluster_id
    }

    /// Extract the blocking component for one field.
    fn key_component(field: &str, value: &str) -> String {
        match field {
            "zip" => value.chars().take(5).collect(),
            "phone" => {
                let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).collect();
                let start = digits.len().saturating_sub(4);
                digits[start..].iter().collect()
            }
            "email" => value
                .split_once('@')
                .map_or_else(|| value.to_string(), |(_, domain)| domain.to_string()),
            // name and everything else: leading character prefix
            _ => value.chars().take(3).collect(),
        }
    }

    /// Derive and store the cluster id on an entity. Disabled clustering
    /// leaves the entity untouched.
    pub fn assign_cluster(&self, entity: &mut EntityRecord) -> String {
        if !self.config.enabled {
            return DEFAULT_CLUSTER_ID.to_string();
        }

        let cluster_id = self.generate_key(&entity.fields_map());
        entity.set_cluster_id(&cluster_id);
        cluster_id
    }

    /// Equality filter for the cluster derived from a query field map, or
    /// `None` when blocking cannot narrow the search.
    #[must_use]
    pub fn filter_for_fields(&self, fields: &HashMap<String, String>) -> Option<EqFilter> {
        if !self.config.enabled {
            return None;
        }
        let cluster_id = self.generate_key(fields);
        if cluster_id == DEFAULT_CLUSTER_ID {
            return None;
        }
        Some(EqFilter::new(CLUSTER_METADATA_KEY, cluster_id))
    }

    /// Equality filter for an entity's already-assigned cluster.
    #[must_use]
    pub fn filter_for_entity(&self, entity: &EntityRecord) -> Option<EqFilter> {
        if !self.config.enabled {
            return None;
        }
        match entity.cluster_id() {
            Some(id) if !id.is_empty() && id != DEFAULT_CLUSTER_ID => {
                Some(EqFilter::new(CLUSTER_METADATA_KEY, id))
            }
            _ => None,
        }
    }

    /// Reassign cluster ids across the whole store, paging and batch-updating.
    /// Returns the number of entities updated.
    pub async fn recompute_all(
        &self,
        store: &dyn VectorStore,
        batch_size: usize,
    ) -> Result<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let mut offset = 0usize;
        let mut updated = 0usize;
        loop {
            let mut entities = store.list(offset, batch_size).await?;
            if entities.is_empty() {
                break;
            }

            let fetched = entities.len();
            for entity in &mut entities {
                self.assign_cluster(entity);
            }
            store.batch_update(entities).await?;

            updated += fetched;
            offset += fetched;
            if fetched < batch_size {
                break;
            }
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(fields: &[&str]) -> ClusterService {
        ClusterService::new(ClusteringConfig {
            enabled: true,
            method: "canopy".to_string(),
            fields: fields.iter().map(|s| (*s).to_string()).collect(),
            similarity_threshold: 0.7,
        })
    }

    fn field_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_key_is_deterministic() {
        let clusters = service(&["name", "zip"]);
        let fields = field_map(&[
            ("name", "Acme Inc"),
            ("name_normalized", "acme"),
            ("zip", "10001"),
            ("zip_normalized", "10001"),
        ]);

        let first = clusters.generate_key(&fields);
        let second = clusters.generate_key(&fields);
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_uses_normalized_with_raw_fallback() {
        let clusters = service(&["name"]);

        let normalized = field_map(&[("name", "ACME INC"), ("name_normalized", "acme")]);
        let raw_only = field_map(&[("name", "acme")]);
        // "acm" component either way.
        assert_eq!(
            clusters.generate_key(&normalized),
            clusters.generate_key(&raw_only)
        );
    }

    #[test]
    fn test_key_components_differ_by_field_rule() {
        let clusters = service(&["phone"]);
        let a = field_map(&[("phone", "+1 212 555 7890")]);
        let b = field_map(&[("phone", "+44 20 9999 7890")]);
        // Same trailing four digits block together.
        assert_eq!(clusters.generate_key(&a), clusters.generate_key(&b));

        let clusters = service(&["email"]);
        let a = field_map(&[("email", "alice@acme.com")]);
        let b = field_map(&[("email", "bob@acme.com")]);
        assert_eq!(clusters.generate_key(&a), clusters.generate_key(&b));

        let c = field_map(&[("email", "alice@other.org")]);
        assert_ne!(clusters.generate_key(&a), clusters.generate_key(&c));
    }

    #[test]
    fn test_empty_fields_fall_back_to_default() {
        let clusters = service(&["name", "zip"]);
        assert_eq!(clusters.generate_key(&HashMap::new()), DEFAULT_CLUSTER_ID);
        assert_eq!(
            clusters.generate_key(&field_map(&[("name", "")])),
            DEFAULT_CLUSTER_ID
        );
    }

    #[test]
    fn test_disabled_clustering_yields_default_and_no_filter() {
        let clusters = ClusterService::new(ClusteringConfig {
            enabled: false,
            ..ClusteringConfig::default()
        });
        let fields = field_map(&[("name", "acme")]);
        assert_eq!(clusters.generate_key(&fields), DEFAULT_CLUSTER_ID);
        assert!(clusters.filter_for_fields(&fields).is_none());
    }

    #[test]
    fn test_assign_and_filter_round_trip() {
        let clusters = service(&["name"]);
        let mut entity = EntityRecord::default();
        entity.set_field("name", "Acme Inc").unwrap();
        entity.set_field("name_normalized", "acme").unwrap();

        let assigned = clusters.assign_cluster(&mut entity);
        assert_eq!(entity.cluster_id(), Some(assigned.as_str()));

        let filter = clusters.filter_for_entity(&entity).unwrap();
        assert_eq!(filter.field, CLUSTER_METADATA_KEY);
        assert_eq!(filter.value, assigned);
    }
}
