//! REST adapter for a Qdrant-compatible vector engine.
//!
//! Entities are stored as points: the id and vector at the top level, every
//! raw/normalized field plus timestamps and metadata in the payload. The
//! engine computes cosine similarity; this adapter converts it back to the
//! distance convention (`distance = 1 - score`) the matching pipeline works
//! in.
//!
//! Reads may be retried by callers; this adapter itself never retries, and
//! writes surface the first transport failure.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use resolve_core::config::VectorStoreConfig;
use resolve_core::{EntityRecord, Error, Result, DISTANCE_METADATA_KEY, FIELD_NAMES};

use crate::{EqFilter, VectorStore};

pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    collection: String,
    dimension: usize,
    schema_ready: Mutex<bool>,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl HttpVectorStore {
    pub fn new(config: &VectorStoreConfig, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Store(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}://{}", config.scheme, config.host.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            collection: config.class_name.clone(),
            dimension,
            schema_ready: Mutex::new(false),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if !self.api_key.is_empty() {
            builder = builder.header("api-key", &self.api_key);
        }
        builder
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Store(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::NotFound(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!("unexpected status {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Store(format!("malformed response: {e}")))
    }

    /// Initialize the collection once per process. Subsequent calls are
    /// no-ops guarded by the flag.
    async fn init_schema_once(&self) -> Result<()> {
        if *self.schema_ready.lock() {
            return Ok(());
        }
        self.create_collection().await?;
        *self.schema_ready.lock() = true;
        Ok(())
    }

    async fn create_collection(&self) -> Result<()> {
        // Existence check first so repeat startups stay idempotent.
        let exists = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await
            .map_err(|e| Error::Store(format!("request failed: {e}")))?
            .status()
            .is_success();

        if exists {
            return Ok(());
        }

        debug!(collection = %self.collection, "creating collection");
        let body = json!({
            "vectors": {
                "size": self.dimension,
                "distance": "Cosine",
            }
        });
        self.send::<Value>(
            self.request(
                reqwest::Method::PUT,
                &format!("/collections/{}", self.collection),
            )
            .json(&body),
        )
        .await?;
        Ok(())
    }

    fn to_payload(entity: &EntityRecord) -> Value {
        let mut payload = serde_json::Map::new();
        for field in FIELD_NAMES {
            if let Some(value) = entity.field(field) {
                payload.insert(field.to_string(), Value::String(value.to_string()));
            }
            let normalized = format!("{field}_normalized");
            if let Some(value) = entity.field(&normalized) {
                payload.insert(normalized, Value::String(value.to_string()));
            }
        }
        payload.insert("created_at".to_string(), Value::from(entity.created_at));
        payload.insert("updated_at".to_string(), Value::from(entity.updated_at));
        if !entity.metadata.is_empty() {
            payload.insert(
                "metadata".to_string(),
                Value::Object(entity.metadata.clone().into_iter().collect()),
            );
        }
        Value::Object(payload)
    }

    fn from_point(point: ScoredPoint) -> Result<EntityRecord> {
        let mut entity = EntityRecord {
            id: match &point.id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            vector: point.vector.unwrap_or_default(),
            ..Default::default()
        };

        if let Some(Value::Object(payload)) = point.payload {
            for (key, value) in payload {
                match key.as_str() {
                    "created_at" => entity.created_at = value.as_i64().unwrap_or_default(),
                    "updated_at" => entity.updated_at = value.as_i64().unwrap_or_default(),
                    "metadata" => {
                        if let Value::Object(map) = value {
                            entity.metadata = map.into_iter().collect::<HashMap<_, _>>();
                        }
                    }
                    field => {
                        if let Some(text) = value.as_str() {
                            // Skip payload keys outside the entity model.
                            let _ = entity.set_field(field, text);
                        }
                    }
                }
            }
        }

        if let Some(score) = point.score {
            let distance = (1.0 - score).clamp(0.0, 2.0);
            entity
                .metadata
                .insert(DISTANCE_METADATA_KEY.to_string(), Value::from(distance));
        }

        Ok(entity)
    }

    fn filter_clause(filter: &EqFilter) -> Value {
        json!({
            "must": [{
                "key": format!("metadata.{}", filter.field),
                "match": { "value": filter.value },
            }]
        })
    }

    async fn upsert_points(&self, entities: &mut [EntityRecord]) -> Result<Vec<String>> {
        self.init_schema_once().await?;

        let now = Utc::now().timestamp();
        let mut ids = Vec::with_capacity(entities.len());
        let mut points = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            entity.ensure_id();
            if entity.created_at == 0 {
                entity.created_at = now;
            }
            entity.updated_at = now;
            ids.push(entity.id.clone());
            points.push(json!({
                "id": entity.id,
                "vector": entity.vector,
                "payload": Self::to_payload(entity),
            }));
        }

        self.send::<Value>(
            self.request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points", self.collection),
            )
            .json(&json!({ "points": points })),
        )
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn health(&self) -> Result<bool> {
        let response = self
            .request(reqwest::Method::GET, "/healthz")
            .send()
            .await
            .map_err(|e| Error::Store(format!("health request failed: {e}")))?;
        Ok(response.status().is_success())
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.init_schema_once().await
    }

    async fn add(&self, entity: EntityRecord) -> Result<String> {
        let mut entities = vec![entity];
        let ids = self.upsert_points(&mut entities).await?;
        Ok(ids.into_iter().next().unwrap_or_default())
    }

    async fn batch_add(&self, entities: Vec<EntityRecord>) -> Result<Vec<String>> {
        let mut entities = entities;
        self.upsert_points(&mut entities).await
    }

    async fn get(&self, id: &str) -> Result<EntityRecord> {
        let response: ApiResponse<ScoredPoint> = self
            .send(self.request(
                reqwest::Method::GET,
                &format!("/collections/{}/points/{id}", self.collection),
            ))
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(id.to_string()),
                other => other,
            })?;

        let point = response
            .result
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Self::from_point(point)
    }

    async fn update(&self, entity: EntityRecord) -> Result<()> {
        // Preserve created_at from the stored record when the caller left it
        // unset.
        let mut entity = entity;
        if entity.created_at == 0 {
            if let Ok(existing) = self.get(&entity.id).await {
                entity.created_at = existing.created_at;
            }
        }
        let mut entities = vec![entity];
        self.upsert_points(&mut entities).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.send::<Value>(
            self.request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete", self.collection),
            )
            .json(&json!({ "points": [id] })),
        )
        .await?;
        Ok(())
    }

    async fn batch_update(&self, entities: Vec<EntityRecord>) -> Result<()> {
        let mut entities = entities;
        self.upsert_points(&mut entities).await?;
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EntityRecord>> {
        // Scroll from the start and skip; fine for the maintenance jobs this
        // backs (bulk cluster recompute), which walk the whole collection
        // anyway.
        let response: ApiResponse<ScrollResult> = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/scroll", self.collection),
                )
                .json(&json!({
                    "limit": offset + limit,
                    "with_payload": true,
                    "with_vector": true,
                })),
            )
            .await?;

        let points = response.result.map(|r| r.points).unwrap_or_default();
        points
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(Self::from_point)
            .collect()
    }

    async fn count(&self) -> Result<usize> {
        let response: ApiResponse<CountResult> = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/count", self.collection),
                )
                .json(&json!({ "exact": true })),
            )
            .await?;

        Ok(response.result.map(|r| r.count).unwrap_or_default())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&EqFilter>,
    ) -> Result<Vec<EntityRecord>> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(f) = filter {
            body["filter"] = Self::filter_clause(f);
        }

        let response: ApiResponse<Vec<ScoredPoint>> = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/search", self.collection),
                )
                .json(&body),
            )
            .await?;

        response
            .result
            .unwrap_or_default()
            .into_iter()
            .map(Self::from_point)
            .collect()
    }
}
