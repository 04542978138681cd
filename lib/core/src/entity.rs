use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// The closed set of raw field names an entity may carry.
///
/// Every raw field has a `_normalized` twin; anything outside this set is
/// rejected at ingest.
pub const FIELD_NAMES: [&str; 7] = ["name", "address", "city", "state", "zip", "phone", "email"];

/// Metadata key holding the blocking cluster id.
pub const CLUSTER_METADATA_KEY: &str = "cluster_id";
/// Metadata key the store attaches to search results (cosine distance in [0, 2]).
pub const DISTANCE_METADATA_KEY: &str = "distance";
/// Metadata key recording BFS hop distance in transitive match groups.
pub const HOP_DISTANCE_KEY: &str = "hop_distance";
/// Cluster id used when no blocking key can be derived.
pub const DEFAULT_CLUSTER_ID: &str = "default";

/// An entity as stored in the vector database: raw fields, their normalized
/// twins, the embedding vector and free-form metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zip_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email_normalized: String,

    /// Epoch seconds; zero means "not yet set" and is filled in by the store.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub updated_at: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl EntityRecord {
    /// Build a record from a raw + normalized field map, rejecting keys
    /// outside the known enumeration.
    pub fn from_fields(
        id: Option<String>,
        fields: &HashMap<String, String>,
        vector: Vec<f32>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Self> {
        let mut entity = EntityRecord {
            id: id.unwrap_or_default(),
            vector,
            metadata: metadata.unwrap_or_default(),
            ..Default::default()
        };
        for (key, value) in fields {
            entity.set_field(key, value)?;
        }
        Ok(entity)
    }

    /// Set a field by name. Accepts raw field names and their `_normalized`
    /// twins; anything else is a validation error.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let slot = match key {
            "name" => &mut self.name,
            "name_normalized" => &mut self.name_normalized,
            "address" => &mut self.address,
            "address_normalized" => &mut self.address_normalized,
            "city" => &mut self.city,
            "city_normalized" => &mut self.city_normalized,
            "state" => &mut self.state,
            "state_normalized" => &mut self.state_normalized,
            "zip" => &mut self.zip,
            "zip_normalized" => &mut self.zip_normalized,
            "phone" => &mut self.phone,
            "phone_normalized" => &mut self.phone_normalized,
            "email" => &mut self.email,
            "email_normalized" => &mut self.email_normalized,
            other => return Err(Error::Validation(format!("unknown entity field: {other}"))),
        };
        *slot = value.to_string();
        Ok(())
    }

    /// Look up a field value by name (raw or `_normalized`).
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        let value = match key {
            "name" => &self.name,
            "name_normalized" => &self.name_normalized,
            "address" => &self.address,
            "address_normalized" => &self.address_normalized,
            "city" => &self.city,
            "city_normalized" => &self.city_normalized,
            "state" => &self.state,
            "state_normalized" => &self.state_normalized,
            "zip" => &self.zip,
            "zip_normalized" => &self.zip_normalized,
            "phone" => &self.phone,
            "phone_normalized" => &self.phone_normalized,
            "email" => &self.email,
            "email_normalized" => &self.email_normalized,
            _ => return None,
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// All non-empty fields, raw and normalized, as a map.
    #[must_use]
    pub fn fields_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for field in FIELD_NAMES {
            if let Some(value) = self.field(field) {
                map.insert(field.to_string(), value.to_string());
            }
            let normalized = format!("{field}_normalized");
            if let Some(value) = self.field(&normalized) {
                map.insert(normalized, value.to_string());
            }
        }
        map
    }

    /// Assign a fresh UUID when the record has no id yet.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        &self.id
    }

    #[must_use]
    pub fn cluster_id(&self) -> Option<&str> {
        self.metadata
            .get(CLUSTER_METADATA_KEY)
            .and_then(Value::as_str)
    }

    pub fn set_cluster_id(&mut self, cluster_id: &str) {
        self.metadata.insert(
            CLUSTER_METADATA_KEY.to_string(),
            Value::String(cluster_id.to_string()),
        );
    }

    /// Cosine distance attached by the store to search results.
    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        self.metadata.get(DISTANCE_METADATA_KEY).and_then(Value::as_f64)
    }
}

/// A caller-supplied entity: an optional id plus a raw field map.
///
/// This is the ingest and match input shape; normalization and embedding
/// happen on the way into the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub fields: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl EntityData {
    /// Validate that every field key is part of the known enumeration.
    pub fn validate(&self) -> Result<()> {
        for key in self.fields.keys() {
            let raw = key.as_str().strip_suffix("_normalized").unwrap_or(key);
            if !FIELD_NAMES.contains(&raw) {
                return Err(Error::Validation(format!("unknown entity field: {key}")));
            }
        }
        Ok(())
    }
}

impl From<&EntityRecord> for EntityData {
    fn from(record: &EntityRecord) -> Self {
        EntityData {
            id: if record.id.is_empty() {
                None
            } else {
                Some(record.id.clone())
            },
            fields: record.fields_map(),
            metadata: if record.metadata.is_empty() {
                None
            } else {
                Some(record.metadata.clone())
            },
        }
    }
}
