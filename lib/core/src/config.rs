//! Configuration for the Resolve engine.
//!
//! Loaded from a YAML file (default `config.yaml`) with `RESOLVE_`-prefixed
//! environment overrides for every scalar key (`RESOLVE_<SECTION>_<KEY>`,
//! e.g. `RESOLVE_EMBEDDING_BATCH_SIZE`). Every section has working defaults
//! so the engine starts without any file at all.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub vector_store: VectorStoreConfig,
    pub embedding: EmbeddingConfig,
    pub matching: MatchingConfig,
    pub clustering: ClusteringConfig,
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            idle_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub host: String,
    pub scheme: String,
    pub api_key: String,
    pub class_name: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost:6333".to_string(),
            scheme: "http".to_string(),
            api_key: String::new(),
            class_name: "Entity".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: String,
    pub batch_size: usize,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub cache_size: usize,
    pub model_name: String,
    pub embedding_dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            batch_size: 32,
            timeout: 30,
            cache_size: 1000,
            model_name: "all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub similarity_threshold: f32,
    pub default_limit: usize,
    pub field_weights: HashMap<String, f32>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let field_weights = [
            ("name", 0.4),
            ("address", 0.2),
            ("city", 0.1),
            ("state", 0.05),
            ("zip", 0.05),
            ("phone", 0.1),
            ("email", 0.1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            similarity_threshold: 0.85,
            default_limit: 10,
            field_weights,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub enabled: bool,
    pub method: String,
    pub fields: Vec<String>,
    pub similarity_threshold: f32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: "canopy".to_string(),
            fields: vec!["name".to_string(), "zip".to_string()],
            similarity_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub enable_stopwords: bool,
    /// Recognized but currently inert; kept for config compatibility.
    pub enable_stemming: bool,
    pub enable_lowercase: bool,
    pub name_options: NameOptions,
    pub address_options: AddressOptions,
    pub phone_options: PhoneOptions,
    pub email_options: EmailOptions,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enable_stopwords: true,
            enable_stemming: true,
            enable_lowercase: true,
            name_options: NameOptions::default(),
            address_options: AddressOptions::default(),
            phone_options: PhoneOptions::default(),
            email_options: EmailOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NameOptions {
    pub remove_legal_suffixes: bool,
    pub normalize_initials: bool,
}

impl Default for NameOptions {
    fn default() -> Self {
        Self {
            remove_legal_suffixes: true,
            normalize_initials: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressOptions {
    pub standardize_abbreviations: bool,
    pub remove_apartment_numbers: bool,
}

impl Default for AddressOptions {
    fn default() -> Self {
        Self {
            standardize_abbreviations: true,
            remove_apartment_numbers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneOptions {
    pub e164_format: bool,
}

impl Default for PhoneOptions {
    fn default() -> Self {
        Self { e164_format: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailOptions {
    pub lowercase_domain: bool,
}

impl Default for EmailOptions {
    fn default() -> Self {
        Self {
            lowercase_domain: true,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file, apply environment
    /// overrides, then validate.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("failed to read {}: {e}", p.display())))?;
                serde_yaml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {e}", p.display())))?
            }
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RESOLVE_<SECTION>_<KEY>` environment overrides for every
    /// scalar configuration key. Values that fail to parse are ignored in
    /// favor of the file/default value.
    fn apply_env_overrides(&mut self) {
        env_override("RESOLVE_SERVER_PORT", &mut self.server.port);

        env_override("RESOLVE_API_HOST", &mut self.api.host);
        env_override("RESOLVE_API_PORT", &mut self.api.port);
        env_override("RESOLVE_API_READ_TIMEOUT_SECS", &mut self.api.read_timeout_secs);
        env_override("RESOLVE_API_WRITE_TIMEOUT_SECS", &mut self.api.write_timeout_secs);
        env_override("RESOLVE_API_IDLE_TIMEOUT_SECS", &mut self.api.idle_timeout_secs);

        env_override("RESOLVE_VECTOR_STORE_HOST", &mut self.vector_store.host);
        env_override("RESOLVE_VECTOR_STORE_SCHEME", &mut self.vector_store.scheme);
        env_override("RESOLVE_VECTOR_STORE_API_KEY", &mut self.vector_store.api_key);
        env_override("RESOLVE_VECTOR_STORE_CLASS_NAME", &mut self.vector_store.class_name);

        env_override("RESOLVE_EMBEDDING_URL", &mut self.embedding.url);
        env_override("RESOLVE_EMBEDDING_BATCH_SIZE", &mut self.embedding.batch_size);
        env_override("RESOLVE_EMBEDDING_TIMEOUT", &mut self.embedding.timeout);
        env_override("RESOLVE_EMBEDDING_CACHE_SIZE", &mut self.embedding.cache_size);
        env_override("RESOLVE_EMBEDDING_MODEL_NAME", &mut self.embedding.model_name);
        env_override("RESOLVE_EMBEDDING_EMBEDDING_DIM", &mut self.embedding.embedding_dim);

        env_override(
            "RESOLVE_MATCHING_SIMILARITY_THRESHOLD",
            &mut self.matching.similarity_threshold,
        );
        env_override("RESOLVE_MATCHING_DEFAULT_LIMIT", &mut self.matching.default_limit);

        env_override("RESOLVE_CLUSTERING_ENABLED", &mut self.clustering.enabled);
        env_override("RESOLVE_CLUSTERING_METHOD", &mut self.clustering.method);
        env_override(
            "RESOLVE_CLUSTERING_SIMILARITY_THRESHOLD",
            &mut self.clustering.similarity_threshold,
        );

        env_override(
            "RESOLVE_NORMALIZATION_ENABLE_STOPWORDS",
            &mut self.normalization.enable_stopwords,
        );
        env_override(
            "RESOLVE_NORMALIZATION_ENABLE_STEMMING",
            &mut self.normalization.enable_stemming,
        );
        env_override(
            "RESOLVE_NORMALIZATION_ENABLE_LOWERCASE",
            &mut self.normalization.enable_lowercase,
        );
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.matching.similarity_threshold) {
            return Err(Error::Config(format!(
                "matching.similarity_threshold must be in [0, 1], got {}",
                self.matching.similarity_threshold
            )));
        }
        if self.matching.default_limit == 0 {
            return Err(Error::Config(
                "matching.default_limit must be positive".to_string(),
            ));
        }
        if self.embedding.embedding_dim == 0 {
            return Err(Error::Config(
                "embedding.embedding_dim must be positive".to_string(),
            ));
        }
        if self.clustering.enabled && self.clustering.fields.is_empty() {
            return Err(Error::Config(
                "clustering.fields must not be empty when clustering is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Overwrite `slot` with the parsed value of `key` when the variable is set
/// and parses as the slot's type.
fn env_override<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        if let Ok(value) = raw.parse() {
            *slot = value;
        }
    }
}
