//! The matching pipeline.
//!
//! `FindMatches` runs: normalize -> embed -> block -> k-NN search ->
//! per-field rescoring -> blend -> rank. Ingest runs the same front half and
//! upserts the embedded, cluster-keyed record.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use resolve_core::{
    Config, EntityData, EntityRecord, Error, Result, FIELD_NAMES,
};
use resolve_embed::EmbeddingService;
use resolve_normalize::Normalizer;
use resolve_similarity::{Comparator, Registry};
use resolve_store::VectorStore;

use crate::cluster::{ClusterService, RECOMPUTE_BATCH_SIZE};

/// Maximum entities per store upsert request.
const STORE_BATCH_SIZE: usize = 100;

/// Per-field similarity detail attached to a match result.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldScore {
    pub score: f32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query_value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matched_value: String,
    #[serde(
        rename = "similarity_function",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub similarity_fn: String,
    #[serde(default)]
    pub normalized: bool,
}

/// A ranked candidate for a match query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    pub score: f32,
    pub fields: HashMap<String, String>,
    pub matched_on: Vec<String>,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_scores: HashMap<String, FieldScore>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Options controlling a single match query.
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Maximum results to return; zero selects the configured default.
    pub limit: usize,
    /// Minimum vector score; zero selects the configured default.
    pub threshold: f32,
    pub include_details: bool,
    /// Force cluster-filtered search even when clustering is off by default.
    pub use_clustering: bool,
    pub include_field_scores: bool,
    /// Per-field weights for blending field scores into the final score.
    pub field_weights: HashMap<String, f32>,
    /// Explicit field -> field-type mappings for comparator selection.
    pub field_type_mappings: HashMap<String, String>,
    /// Fields that must match exactly regardless of their type.
    pub force_exact_match_fields: Vec<String>,
}

/// Orchestrates normalization, embedding, blocking, search and rescoring.
pub struct MatchService {
    config: Arc<Config>,
    normalizer: Normalizer,
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    clusters: ClusterService,
    registry: Registry,
}

impl MatchService {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Self {
        let normalizer = Normalizer::new(config.normalization.clone());
        let clusters = ClusterService::new(config.clustering.clone());
        Self {
            config,
            normalizer,
            embedder,
            store,
            clusters,
            registry: Registry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Normalize, embed and upsert a single entity. Returns the stored id.
    pub async fn add_entity(&self, data: EntityData) -> Result<String> {
        data.validate()?;

        let normalized = self.normalizer.normalize_entity(&data.fields);
        let text = combined_text(&normalized);
        let vector = self.embedder.embed(&text).await?;

        let mut entity =
            EntityRecord::from_fields(data.id.clone(), &normalized, vector, data.metadata.clone())?;
        if self.clusters.enabled() {
            self.clusters.assign_cluster(&mut entity);
        }

        self.store.add(entity).await
    }

    /// Normalize, embed and upsert a batch. Embedding runs in
    /// `embedding.batch_size` chunks and store writes in chunks of 100; a
    /// failure reports how many entities were already committed and the index
    /// the batch stopped at.
    pub async fn add_entities(&self, data: Vec<EntityData>) -> Result<Vec<String>> {
        if data.is_empty() {
            return Err(Error::Validation("no entities provided".to_string()));
        }
        for item in &data {
            item.validate()?;
        }

        // Normalize everything up front; embedding and writes stream behind.
        let normalized: Vec<HashMap<String, String>> = data
            .iter()
            .map(|item| self.normalizer.normalize_entity(&item.fields))
            .collect();
        let texts: Vec<String> = normalized.iter().map(combined_text).collect();

        let batch_size = self.config.embedding.batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for (start, chunk) in texts.chunks(batch_size).enumerate() {
            let embedded = self
                .embedder
                .embed_batch(chunk)
                .await
                .map_err(|e| Error::partial_ingest(0, start * batch_size, e))?;
            vectors.extend(embedded);
        }

        let mut entities = Vec::with_capacity(data.len());
        for ((item, fields), vector) in data.iter().zip(&normalized).zip(vectors) {
            let mut entity =
                EntityRecord::from_fields(item.id.clone(), fields, vector, item.metadata.clone())?;
            if self.clusters.enabled() {
                self.clusters.assign_cluster(&mut entity);
            }
            entities.push(entity);
        }

        let mut ids = Vec::with_capacity(entities.len());
        let mut committed = 0usize;
        for chunk in chunked(entities, STORE_BATCH_SIZE) {
            let chunk_len = chunk.len();
            let chunk_ids = self
                .store
                .batch_add(chunk)
                .await
                .map_err(|e| Error::partial_ingest(committed, committed, e))?;
            committed += chunk_len;
            ids.extend(chunk_ids);
        }

        debug!(count = ids.len(), "ingested entities");
        Ok(ids)
    }

    /// Find the entities most similar to a free-text query. Inline
    /// `field=value` pairs (separated by `;` or `,`) additionally drive
    /// per-field rescoring.
    pub async fn find_matches(&self, text: &str, opts: &MatchOptions) -> Result<Vec<MatchResult>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("query text is required".to_string()));
        }

        let parsed = parse_query_fields(text);
        let query_fields = if parsed.is_empty() {
            HashMap::new()
        } else {
            self.normalizer.normalize_entity(&parsed)
        };

        self.find_matches_inner(text, &query_fields, None, opts).await
    }

    /// Find the entities most similar to a structured entity. The entity's
    /// own id is excluded from the results.
    pub async fn find_matches_for_entity(
        &self,
        entity: &EntityData,
        opts: &MatchOptions,
    ) -> Result<Vec<MatchResult>> {
        entity.validate()?;
        if entity.fields.values().all(String::is_empty) {
            return Err(Error::Validation("entity has no field values".to_string()));
        }

        let normalized = self.normalizer.normalize_entity(&entity.fields);
        let text = combined_text(&normalized);

        self.find_matches_inner(&text, &normalized, entity.id.as_deref(), opts)
            .await
    }

    async fn find_matches_inner(
        &self,
        text: &str,
        query_fields: &HashMap<String, String>,
        exclude_id: Option<&str>,
        opts: &MatchOptions,
    ) -> Result<Vec<MatchResult>> {
        // Step 1: resolve defaults.
        let limit = if opts.limit == 0 {
            self.config.matching.default_limit
        } else {
            opts.limit
        };
        let threshold = if opts.threshold <= 0.0 {
            self.config.matching.similarity_threshold
        } else {
            opts.threshold
        };
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Validation(format!(
                "threshold must be in [0, 1], got {threshold}"
            )));
        }
        let use_clustering = opts.use_clustering || self.config.clustering.enabled;

        // Steps 2-3: embed the query.
        let vector = self.embedder.embed(text).await?;

        // Step 4: derive the cluster filter from whatever structure the
        // query carries.
        let filter = if use_clustering && self.clusters.enabled() {
            if query_fields.is_empty() {
                let mut name_only = HashMap::new();
                name_only.insert("name".to_string(), text.to_string());
                self.clusters.filter_for_fields(&name_only)
            } else {
                self.clusters.filter_for_fields(query_fields)
            }
        } else {
            None
        };

        // Step 5: oversample when blocking narrows the candidate set.
        let search_limit = if use_clustering { limit * 3 } else { limit };

        // Step 6: k-NN, retrying unfiltered when the cluster is empty.
        let mut candidates = self
            .store
            .search(&vector, search_limit, filter.as_ref())
            .await?;
        if candidates.is_empty() && filter.is_some() {
            debug!("cluster-filtered search returned nothing; retrying unfiltered");
            candidates = self.store.search(&vector, search_limit, None).await?;
        }

        // Steps 7-9: score, gate, rescore, blend.
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let distance = candidate.distance().unwrap_or(0.0);
            let vector_score = (1.0 - distance as f32).clamp(0.0, 1.0);
            if vector_score < threshold {
                continue;
            }
            if exclude_id.is_some_and(|id| id == candidate.id) {
                continue;
            }

            let mut result = to_match_result(&candidate, vector_score);

            let has_query_fields = query_fields.keys().any(|k| !k.ends_with("_normalized"));
            if opts.include_field_scores || has_query_fields {
                self.compute_field_scores(&mut result, query_fields, opts);
            }

            if !opts.field_weights.is_empty() && !result.field_scores.is_empty() {
                let weighted = weighted_field_score(&result.field_scores, &opts.field_weights);
                result.score = (vector_score + weighted) / 2.0;
                // Blending can pull a candidate back under the gate.
                if result.score < threshold {
                    continue;
                }
            }

            results.push(result);
        }

        // Step 10: rank with a stable tie-break and truncate.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Attach per-field similarity detail, comparing query values against the
    /// candidate's normalized values.
    fn compute_field_scores(
        &self,
        result: &mut MatchResult,
        query_fields: &HashMap<String, String>,
        opts: &MatchOptions,
    ) {
        if query_fields.is_empty() {
            // No structured query: record each populated candidate field
            // compared against itself so callers still see which comparator
            // applies where.
            for field in FIELD_NAMES {
                let Some(value) = result.fields.get(field).filter(|v| !v.is_empty()) else {
                    continue;
                };
                let comparator = self.comparator_for(field, opts);
                let score = comparator.compare(value, value) as f32;
                result.field_scores.insert(
                    field.to_string(),
                    FieldScore {
                        score,
                        matched_value: value.clone(),
                        similarity_fn: comparator.name().to_string(),
                        normalized: true,
                        ..Default::default()
                    },
                );
            }
            return;
        }

        for (field, query_value) in query_fields {
            if field.ends_with("_normalized") || query_value.is_empty() {
                continue;
            }

            // Prefer the candidate's normalized value; a raw-only candidate
            // still participates.
            let normalized_key = format!("{field}_normalized");
            let Some(matched_value) = result
                .fields
                .get(&normalized_key)
                .or_else(|| result.fields.get(field))
                .filter(|v| !v.is_empty())
            else {
                continue;
            };

            let query_value = query_fields
                .get(&normalized_key)
                .filter(|v| !v.is_empty())
                .unwrap_or(query_value);

            let comparator = self.comparator_for(field, opts);
            let score = comparator.compare(query_value, matched_value) as f32;
            result.field_scores.insert(
                field.clone(),
                FieldScore {
                    score,
                    query_value: query_value.clone(),
                    matched_value: matched_value.clone(),
                    similarity_fn: comparator.name().to_string(),
                    normalized: true,
                },
            );
        }
    }

    fn comparator_for(&self, field: &str, opts: &MatchOptions) -> &dyn Comparator {
        if opts.force_exact_match_fields.iter().any(|f| f == field) {
            return self.registry.exact_match();
        }
        if let Some(field_type) = opts.field_type_mappings.get(field) {
            return self.registry.by_field_type(field_type);
        }
        self.registry.infer_from_field_name(field)
    }

    /// Reassign every stored entity's cluster key.
    pub async fn recompute_clusters(&self) -> Result<usize> {
        if !self.clusters.enabled() {
            return Err(Error::Validation(
                "clustering is not enabled in the configuration".to_string(),
            ));
        }
        self.clusters
            .recompute_all(self.store.as_ref(), RECOMPUTE_BATCH_SIZE)
            .await
    }

    pub async fn entity_count(&self) -> Result<usize> {
        self.store.count().await
    }
}

/// Concatenate present normalized fields in the fixed order
/// `name, address, city, state, zip, phone, email`.
pub fn combined_text(fields: &HashMap<String, String>) -> String {
    let mut parts = Vec::new();
    for field in FIELD_NAMES {
        let normalized = format!("{field}_normalized");
        let value = fields
            .get(&normalized)
            .filter(|v| !v.is_empty())
            .or_else(|| fields.get(field).filter(|v| !v.is_empty()));
        if let Some(value) = value {
            parts.push(value.as_str());
        }
    }
    parts.join(" ")
}

/// Parse inline `field=value` pairs from free text. Pairs are separated by
/// `;` when present, otherwise `,`; text without `=` yields an empty map.
pub fn parse_query_fields(text: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    if !text.contains('=') {
        return fields;
    }

    let pairs: Vec<&str> = if text.contains(';') {
        text.split(';').collect()
    } else if text.contains(',') {
        text.split(',').collect()
    } else {
        vec![text]
    };

    for pair in pairs {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((field, value)) = pair.split_once('=') else {
            continue;
        };
        let field = field.trim();
        let value = value.trim();
        if !field.is_empty() && !value.is_empty() {
            fields.insert(field.to_string(), value.to_string());
        }
    }

    fields
}

/// Weighted mean of field scores; fields without an explicit weight count at
/// 1.0.
fn weighted_field_score(
    field_scores: &HashMap<String, FieldScore>,
    weights: &HashMap<String, f32>,
) -> f32 {
    let mut total_score = 0.0f32;
    let mut total_weight = 0.0f32;

    for (field, field_score) in field_scores {
        let weight = weights.get(field).copied().unwrap_or(1.0);
        total_score += field_score.score * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        return 0.0;
    }
    total_score / total_weight
}

/// Convert a stored record into a result row at the given score.
pub(crate) fn to_match_result(entity: &EntityRecord, score: f32) -> MatchResult {
    let fields = entity.fields_map();
    let matched_on = matched_fields(&fields);
    let explanation = explanation(score, &matched_on);

    MatchResult {
        id: entity.id.clone(),
        score,
        fields,
        matched_on,
        explanation,
        metadata: entity.metadata.clone(),
        created_at: entity.created_at,
        updated_at: entity.updated_at,
        field_scores: HashMap::new(),
    }
}

/// Non-empty raw fields, in canonical order.
fn matched_fields(fields: &HashMap<String, String>) -> Vec<String> {
    FIELD_NAMES
        .into_iter()
        .filter(|f| fields.get(*f).is_some_and(|v| !v.is_empty()))
        .map(str::to_string)
        .collect()
}

fn explanation(score: f32, matched_on: &[String]) -> String {
    let confidence = if score >= 0.9 {
        "high"
    } else if score < 0.7 {
        "low"
    } else {
        "medium"
    };
    format!(
        "Matched with {confidence} confidence ({score:.2}) on fields: {}",
        matched_on.join(", ")
    )
}

/// Split a vector into owned chunks of at most `size` elements.
fn chunked<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
