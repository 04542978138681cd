//! In-process vector store.
//!
//! Brute-force cosine search over a locked map. Used by the test suites and
//! by offline CLI runs; it satisfies the full [`VectorStore`] contract so
//! the matching pipeline is identical against it and a remote engine.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use resolve_core::{EntityRecord, Error, Result, DISTANCE_METADATA_KEY};

use crate::{cosine_distance, EqFilter, VectorStore};

pub struct MemoryVectorStore {
    dimension: usize,
    entities: RwLock<HashMap<String, EntityRecord>>,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entities: RwLock::new(HashMap::new()),
        }
    }

    fn check_dimension(&self, entity: &EntityRecord) -> Result<()> {
        if !entity.vector.is_empty() && entity.vector.len() != self.dimension {
            return Err(Error::Validation(format!(
                "invalid vector dimension: expected {}, got {}",
                self.dimension,
                entity.vector.len()
            )));
        }
        Ok(())
    }

    fn matches_filter(entity: &EntityRecord, filter: &EqFilter) -> bool {
        entity
            .metadata
            .get(&filter.field)
            .and_then(Value::as_str)
            .is_some_and(|v| v == filter.value)
    }

    fn upsert(&self, mut entity: EntityRecord) -> Result<String> {
        self.check_dimension(&entity)?;
        entity.ensure_id();

        let now = Utc::now().timestamp();
        if entity.created_at == 0 {
            entity.created_at = now;
        }
        entity.updated_at = now;

        let id = entity.id.clone();
        self.entities.write().insert(id.clone(), entity);
        Ok(id)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn add(&self, entity: EntityRecord) -> Result<String> {
        self.upsert(entity)
    }

    async fn batch_add(&self, entities: Vec<EntityRecord>) -> Result<Vec<String>> {
        entities.into_iter().map(|e| self.upsert(e)).collect()
    }

    async fn get(&self, id: &str) -> Result<EntityRecord> {
        self.entities
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn update(&self, mut entity: EntityRecord) -> Result<()> {
        self.check_dimension(&entity)?;
        let mut entities = self.entities.write();
        let existing = entities
            .get(&entity.id)
            .ok_or_else(|| Error::NotFound(entity.id.clone()))?;

        entity.created_at = existing.created_at;
        entity.updated_at = Utc::now().timestamp();
        entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entities
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn batch_update(&self, entities: Vec<EntityRecord>) -> Result<()> {
        for entity in entities {
            self.update(entity).await?;
        }
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EntityRecord>> {
        let entities = self.entities.read();
        let mut all: Vec<&EntityRecord> = entities.values().collect();
        // Stable pagination order.
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entities.read().len())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&EqFilter>,
    ) -> Result<Vec<EntityRecord>> {
        let entities = self.entities.read();

        let mut scored: Vec<(f64, EntityRecord)> = entities
            .values()
            .filter(|e| filter.is_none_or(|f| Self::matches_filter(e, f)))
            .map(|e| (cosine_distance(vector, &e.vector), e.clone()))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(distance, mut entity)| {
                entity.metadata.insert(
                    DISTANCE_METADATA_KEY.to_string(),
                    Value::from(distance),
                );
                entity
            })
            .collect())
    }
}
