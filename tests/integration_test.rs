// End-to-end tests for the matching pipeline over the in-memory store.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use resolve::prelude::*;

const DIM: usize = 64;

fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.embedding_dim = DIM;
    config.matching.similarity_threshold = 0.7;
    config.matching.default_limit = 10;
    config
}

fn entity(id: &str, fields: &[(&str, &str)]) -> EntityData {
    EntityData {
        id: Some(id.to_string()),
        fields: fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        metadata: None,
    }
}

fn service_with(config: Config) -> (Arc<MatchService>, Arc<MemoryVectorStore>) {
    let store = Arc::new(MemoryVectorStore::new(config.embedding.embedding_dim));
    let embedder: Arc<dyn EmbeddingService> =
        Arc::new(MockEmbeddingService::new(config.embedding.embedding_dim));
    let service = Arc::new(MatchService::new(
        Arc::new(config),
        store.clone() as Arc<dyn VectorStore>,
        embedder,
    ));
    (service, store)
}

#[tokio::test]
async fn test_ingest_round_trip() {
    let (service, store) = service_with(test_config());

    let id = service
        .add_entity(entity(
            "a1",
            &[
                ("name", "Acme Inc."),
                ("address", "123 Main Street Apt 4B"),
                ("city", "New York"),
                ("state", "New York"),
                ("zip", "10001-1234"),
                ("phone", "(212) 555-7890"),
                ("email", "Info@ACME.com"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(id, "a1");

    let stored = store.get("a1").await.unwrap();
    // Raw values survive untouched.
    assert_eq!(stored.name, "Acme Inc.");
    assert_eq!(stored.zip, "10001-1234");
    // Normalized twins hold the canonical forms.
    assert_eq!(stored.name_normalized, "acme");
    assert_eq!(stored.address_normalized, "123 main st");
    assert_eq!(stored.state_normalized, "NY");
    assert_eq!(stored.zip_normalized, "10001");
    assert_eq!(stored.phone_normalized, "+12125557890");
    assert_eq!(stored.email_normalized, "Info@acme.com");
    assert_eq!(stored.vector.len(), DIM);
    assert!(stored.created_at > 0);
}

#[tokio::test]
async fn test_ingest_rejects_unknown_fields() {
    let (service, _) = service_with(test_config());
    let err = service
        .add_entity(entity("bad", &[("ssn", "000-00-0000")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_legal_suffix_match() {
    let (service, _) = service_with(test_config());
    service
        .add_entity(entity("A", &[("name", "Acme Inc.")]))
        .await
        .unwrap();

    let opts = MatchOptions {
        threshold: 0.5,
        include_field_scores: true,
        ..MatchOptions::default()
    };
    let matches = service.find_matches("Acme", &opts).await.unwrap();

    assert!(!matches.is_empty());
    let top = &matches[0];
    assert_eq!(top.id, "A");
    assert!(top.score >= 0.9, "got {}", top.score);

    let name_score = top.field_scores.get("name").unwrap();
    assert_eq!(name_score.similarity_fn, "NameSimilarity");
    assert!(name_score.score >= 0.9);
}

#[tokio::test]
async fn test_results_sorted_gated_and_limited() {
    let (service, _) = service_with(test_config());

    let names = [
        "acme widgets",
        "acme widget",
        "acme widgets co",
        "acme trading",
        "zebra mining corp",
    ];
    for (i, name) in names.into_iter().enumerate() {
        service
            .add_entity(entity(&format!("e{i}"), &[("name", name)]))
            .await
            .unwrap();
    }

    let opts = MatchOptions {
        threshold: 0.5,
        limit: 3,
        ..MatchOptions::default()
    };
    let matches = service.find_matches("acme widgets", &opts).await.unwrap();

    assert!(matches.len() <= 3);
    assert!(!matches.is_empty());
    for window in matches.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
    for matched in &matches {
        assert!(matched.score >= 0.5);
    }
    assert_eq!(matches[0].fields.get("name").unwrap(), "acme widgets");
}

#[tokio::test]
async fn test_equal_scores_break_ties_by_id() {
    let (service, _) = service_with(test_config());
    // Identical content under two ids produces identical scores.
    service
        .add_entity(entity("b", &[("name", "acme widgets")]))
        .await
        .unwrap();
    service
        .add_entity(entity("a", &[("name", "acme widgets")]))
        .await
        .unwrap();

    let opts = MatchOptions {
        threshold: 0.5,
        ..MatchOptions::default()
    };
    let matches = service.find_matches("acme widgets", &opts).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "a");
    assert_eq!(matches[1].id, "b");
}

#[tokio::test]
async fn test_field_weight_blending() {
    let (service, _) = service_with(test_config());
    service
        .add_entity(entity("A", &[("name", "Acme Inc"), ("zip", "10001")]))
        .await
        .unwrap();

    let mut field_weights = HashMap::new();
    field_weights.insert("name".to_string(), 1.0);
    field_weights.insert("zip".to_string(), 1.0);

    let opts = MatchOptions {
        threshold: 0.01,
        include_field_scores: true,
        field_weights,
        ..MatchOptions::default()
    };
    // Same name, wrong zip: blended score dips below the pure vector score.
    let matches = service
        .find_matches("name=Acme Inc; zip=99999", &opts)
        .await
        .unwrap();

    assert!(!matches.is_empty());
    let top = &matches[0];
    let name_score = top.field_scores.get("name").unwrap().score;
    let zip_score = top.field_scores.get("zip").unwrap().score;
    assert!(name_score >= 0.99);
    assert_eq!(zip_score, 0.0);

    let vector_score = 1.0 - top.metadata.get("distance").unwrap().as_f64().unwrap() as f32;
    let expected = (vector_score + (name_score + zip_score) / 2.0) / 2.0;
    assert!((top.score - expected).abs() < 1e-5, "got {} want {expected}", top.score);
}

#[tokio::test]
async fn test_forced_exact_match_fields() {
    let (service, _) = service_with(test_config());
    service
        .add_entity(entity("A", &[("name", "Acme Inc")]))
        .await
        .unwrap();

    let opts = MatchOptions {
        threshold: 0.01,
        include_field_scores: true,
        force_exact_match_fields: vec!["name".to_string()],
        ..MatchOptions::default()
    };
    let matches = service.find_matches("name=Acme Inc.", &opts).await.unwrap();

    let top = &matches[0];
    let name_score = top.field_scores.get("name").unwrap();
    assert_eq!(name_score.similarity_fn, "ExactMatch");
    // "acme inc." normalizes to "acme" on both sides, so exact match holds.
    assert_eq!(name_score.score, 1.0);
}

/// Store wrapper recording the filters passed to search.
struct RecordingStore {
    inner: MemoryVectorStore,
    filters: Mutex<Vec<Option<EqFilter>>>,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn health(&self) -> Result<bool> {
        self.inner.health().await
    }
    async fn ensure_schema(&self) -> Result<()> {
        self.inner.ensure_schema().await
    }
    async fn add(&self, entity: EntityRecord) -> Result<String> {
        self.inner.add(entity).await
    }
    async fn batch_add(&self, entities: Vec<EntityRecord>) -> Result<Vec<String>> {
        self.inner.batch_add(entities).await
    }
    async fn get(&self, id: &str) -> Result<EntityRecord> {
        self.inner.get(id).await
    }
    async fn update(&self, entity: EntityRecord) -> Result<()> {
        self.inner.update(entity).await
    }
    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
    async fn batch_update(&self, entities: Vec<EntityRecord>) -> Result<()> {
        self.inner.batch_update(entities).await
    }
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EntityRecord>> {
        self.inner.list(offset, limit).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&EqFilter>,
    ) -> Result<Vec<EntityRecord>> {
        self.filters.lock().unwrap().push(filter.cloned());
        self.inner.search(vector, limit, filter).await
    }
}

#[tokio::test]
async fn test_cluster_gating_filters_search() {
    let mut config = test_config();
    config.clustering.enabled = true;
    config.clustering.fields = vec!["name".to_string(), "zip".to_string()];

    let store = Arc::new(RecordingStore {
        inner: MemoryVectorStore::new(DIM),
        filters: Mutex::new(Vec::new()),
    });
    let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(DIM));
    let service = MatchService::new(
        Arc::new(config),
        store.clone() as Arc<dyn VectorStore>,
        embedder,
    );

    // Entities spread over distinct blocking keys; exactly one shares the
    // query's key.
    service
        .add_entity(entity("target", &[("name", "Acme Inc"), ("zip", "10001")]))
        .await
        .unwrap();
    service
        .add_entity(entity("other-zip", &[("name", "Acme Inc"), ("zip", "94105")]))
        .await
        .unwrap();
    service
        .add_entity(entity("other-name", &[("name", "Zebra Co"), ("zip", "10001")]))
        .await
        .unwrap();

    let stored = store.get("target").await.unwrap();
    let expected_cluster = stored.cluster_id().unwrap().to_string();

    let opts = MatchOptions {
        threshold: 0.3,
        ..MatchOptions::default()
    };
    let matches = service
        .find_matches_for_entity(
            &entity("query", &[("name", "Acme Incorporated"), ("zip", "10001-9999")]),
            &opts,
        )
        .await
        .unwrap();

    // The first search carried the cluster equality filter.
    let filters = store.filters.lock().unwrap();
    let first = filters.first().unwrap().clone().unwrap();
    assert_eq!(first.field, "cluster_id");
    assert_eq!(first.value, expected_cluster);

    // Only the same-cluster entity comes back.
    assert!(matches.iter().any(|m| m.id == "target"));
    assert!(matches.iter().all(|m| m.id != "other-zip" && m.id != "other-name"));
}

#[tokio::test]
async fn test_cluster_filter_retry_without_results() {
    let mut config = test_config();
    config.clustering.enabled = true;
    config.clustering.fields = vec!["name".to_string()];

    let store = Arc::new(RecordingStore {
        inner: MemoryVectorStore::new(DIM),
        filters: Mutex::new(Vec::new()),
    });
    let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(DIM));
    let service = MatchService::new(
        Arc::new(config),
        store.clone() as Arc<dyn VectorStore>,
        embedder,
    );

    // Stored entity sits in a different cluster than the query.
    service
        .add_entity(entity("far", &[("name", "Zebra Mining")]))
        .await
        .unwrap();

    let opts = MatchOptions {
        threshold: 0.0,
        ..MatchOptions::default()
    };
    let _ = service
        .find_matches_for_entity(&entity("q", &[("name", "Acme Widgets")]), &opts)
        .await
        .unwrap();

    let filters = store.filters.lock().unwrap();
    assert_eq!(filters.len(), 2);
    assert!(filters[0].is_some());
    assert!(filters[1].is_none());
}

/// Embedder with fixed per-text vectors, for controlled score scenarios.
struct TableEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl EmbeddingService for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0, 0.0]))
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::new();
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
    async fn health(&self) -> Result<()> {
        Ok(())
    }
    fn dimension(&self) -> usize {
        2
    }
}

fn chain_service() -> (Arc<MatchService>, Arc<MemoryVectorStore>) {
    let mut config = test_config();
    config.embedding.embedding_dim = 2;

    // A-B cosine 0.92, B-C ~0.87, A-C 0.60: B bridges A and C across the
    // 0.7 threshold.
    let mut vectors = HashMap::new();
    vectors.insert("alpha one".to_string(), vec![1.0, 0.0]);
    vectors.insert("alpha two".to_string(), vec![0.92, 0.391_918_4]);
    vectors.insert("alpha three".to_string(), vec![0.6, 0.8]);

    let store = Arc::new(MemoryVectorStore::new(2));
    let embedder: Arc<dyn EmbeddingService> = Arc::new(TableEmbedder { vectors });
    let service = Arc::new(MatchService::new(
        Arc::new(config),
        store.clone() as Arc<dyn VectorStore>,
        embedder,
    ));
    (service, store)
}

#[tokio::test]
async fn test_group_transitive_bridges_through_neighbors() {
    let (service, _) = chain_service();
    for (id, name) in [("A", "alpha one"), ("B", "alpha two"), ("C", "alpha three")] {
        service.add_entity(entity(id, &[("name", name)])).await.unwrap();
    }

    let opts = MatchGroupOptions {
        threshold: 0.7,
        hops_limit: 2,
        strategy: GroupStrategy::Transitive,
        ..MatchGroupOptions::default()
    };
    let group = service.get_match_group("A", &opts).await.unwrap();

    let ids: Vec<&str> = group.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(group.size, 3);
    assert_eq!(group.primary_id, "A");
    assert_eq!(group.entities[0].score, 1.0);

    // C is two hops out.
    let c = group.entities.iter().find(|e| e.id == "C").unwrap();
    assert_eq!(c.metadata.get("hop_distance").unwrap().as_u64(), Some(2));

    // Group score is the member mean.
    let mean = group.entities.iter().map(|e| e.score).sum::<f32>() / group.size as f32;
    assert!((group.score - mean).abs() < 1e-6);

    // No duplicate members.
    let mut unique = ids.clone();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
}

#[tokio::test]
async fn test_group_direct_excludes_distant_members() {
    let (service, _) = chain_service();
    for (id, name) in [("A", "alpha one"), ("B", "alpha two"), ("C", "alpha three")] {
        service.add_entity(entity(id, &[("name", name)])).await.unwrap();
    }

    let opts = MatchGroupOptions {
        threshold: 0.7,
        strategy: GroupStrategy::Direct,
        ..MatchGroupOptions::default()
    };
    let group = service.get_match_group("A", &opts).await.unwrap();

    let ids: Vec<&str> = group.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
}

#[tokio::test]
async fn test_group_respects_max_size() {
    let (service, _) = chain_service();
    for (id, name) in [("A", "alpha one"), ("B", "alpha two"), ("C", "alpha three")] {
        service.add_entity(entity(id, &[("name", name)])).await.unwrap();
    }

    let opts = MatchGroupOptions {
        threshold: 0.7,
        hops_limit: 3,
        max_size: 2,
        strategy: GroupStrategy::Transitive,
        ..MatchGroupOptions::default()
    };
    let group = service.get_match_group("A", &opts).await.unwrap();
    assert_eq!(group.size, 2);
}

#[tokio::test]
async fn test_group_missing_primary_is_not_found() {
    let (service, _) = service_with(test_config());
    let err = service
        .get_match_group("ghost", &MatchGroupOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_group_sample_field_agreement() {
    let (service, _) = service_with(test_config());
    // Identical after normalization, so they match at full score.
    service
        .add_entity(entity("A", &[("name", "Acme Inc"), ("city", "Portland")]))
        .await
        .unwrap();
    service
        .add_entity(entity("B", &[("name", "Acme Inc."), ("city", "Portland")]))
        .await
        .unwrap();

    let opts = MatchGroupOptions {
        threshold: 0.2,
        strategy: GroupStrategy::Direct,
        ..MatchGroupOptions::default()
    };
    let group = service.get_match_group("A", &opts).await.unwrap();
    assert_eq!(group.size, 2);

    let city = group.sample_fields.get("city").unwrap();
    assert_eq!(city.value, "Portland");
    assert!((city.agreement - 1.0).abs() < 1e-6);
    assert!((city.confidence - group.score).abs() < 1e-6);
    assert!(city.agreement >= 0.0 && city.agreement <= 1.0);
}

/// Store that fails batch writes after the first chunk.
struct FlakyStore {
    inner: MemoryVectorStore,
    batches_before_failure: Mutex<usize>,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn health(&self) -> Result<bool> {
        self.inner.health().await
    }
    async fn ensure_schema(&self) -> Result<()> {
        self.inner.ensure_schema().await
    }
    async fn add(&self, entity: EntityRecord) -> Result<String> {
        self.inner.add(entity).await
    }
    async fn batch_add(&self, entities: Vec<EntityRecord>) -> Result<Vec<String>> {
        {
            let mut remaining = self.batches_before_failure.lock().unwrap();
            if *remaining == 0 {
                return Err(Error::Store("write refused".to_string()));
            }
            *remaining -= 1;
        }
        self.inner.batch_add(entities).await
    }
    async fn get(&self, id: &str) -> Result<EntityRecord> {
        self.inner.get(id).await
    }
    async fn update(&self, entity: EntityRecord) -> Result<()> {
        self.inner.update(entity).await
    }
    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }
    async fn batch_update(&self, entities: Vec<EntityRecord>) -> Result<()> {
        self.inner.batch_update(entities).await
    }
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EntityRecord>> {
        self.inner.list(offset, limit).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&EqFilter>,
    ) -> Result<Vec<EntityRecord>> {
        self.inner.search(vector, limit, filter).await
    }
}

#[tokio::test]
async fn test_partial_ingest_reports_committed_count() {
    let store = Arc::new(FlakyStore {
        inner: MemoryVectorStore::new(DIM),
        batches_before_failure: Mutex::new(1),
    });
    let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(DIM));
    let service = MatchService::new(
        Arc::new(test_config()),
        store.clone() as Arc<dyn VectorStore>,
        embedder,
    );

    // 150 entities: the first store chunk (100) lands, the second fails.
    let batch: Vec<EntityData> = (0..150)
        .map(|i| {
            let name = format!("acme {i}");
            entity(&format!("e{i}"), &[("name", name.as_str())])
        })
        .collect();

    let err = service.add_entities(batch).await.unwrap_err();
    match err {
        Error::PartialIngest {
            committed,
            failed_index,
            ..
        } => {
            assert_eq!(committed, 100);
            assert_eq!(failed_index, 100);
        }
        other => panic!("expected PartialIngest, got {other:?}"),
    }
    assert_eq!(store.count().await.unwrap(), 100);
}

#[tokio::test]
async fn test_recompute_clusters_updates_all() {
    let mut config = test_config();
    config.clustering.enabled = true;
    config.clustering.fields = vec!["zip".to_string()];

    let (service, store) = {
        let store = Arc::new(MemoryVectorStore::new(DIM));
        let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(DIM));
        let service = Arc::new(MatchService::new(
            Arc::new(config),
            store.clone() as Arc<dyn VectorStore>,
            embedder,
        ));
        (service, store)
    };

    for i in 0..5 {
        let zip = format!("1000{i}");
        service
            .add_entity(entity(
                &format!("e{i}"),
                &[("name", "acme"), ("zip", zip.as_str())],
            ))
            .await
            .unwrap();
    }

    let updated = service.recompute_clusters().await.unwrap();
    assert_eq!(updated, 5);

    for i in 0..5 {
        let stored = store.get(&format!("e{i}")).await.unwrap();
        assert!(stored.cluster_id().is_some());
        assert_ne!(stored.cluster_id().unwrap(), "default");
    }
}

#[tokio::test]
async fn test_empty_ingest_batch_is_rejected() {
    let (service, _) = service_with(test_config());
    let err = service.add_entities(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let (service, _) = service_with(test_config());
    let err = service
        .find_matches("  ", &MatchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
