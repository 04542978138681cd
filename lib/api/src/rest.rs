//! REST handlers.
//!
//! Thin request/response glue over [`MatchService`] and the vector store.
//! Error bodies are always `{"error": "..."}`; status codes follow the core
//! error taxonomy (400 validation, 404 not found, 502 upstream, 500 other).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use resolve_core::{Config, EntityData, EntityRecord, Error};
use resolve_match::{GroupStrategy, MatchGroupOptions, MatchOptions, MatchService};
use resolve_store::VectorStore;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn VectorStore>,
    pub service: Arc<MatchService>,
}

pub(crate) fn error_response(err: &Error) -> HttpResponse {
    let body = json!({ "error": err.to_string() });
    match err {
        Error::Validation(_) => HttpResponse::BadRequest().json(body),
        Error::NotFound(_) => HttpResponse::NotFound().json(body),
        Error::Embedding(_) | Error::Store(_) | Error::PartialIngest { .. } => {
            HttpResponse::BadGateway().json(body)
        }
        Error::Cancelled(_) => HttpResponse::RequestTimeout().json(body),
        Error::Config(_) | Error::Internal(_) => HttpResponse::InternalServerError().json(body),
    }
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message.into() }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/entities", web::post().to(add_entity))
        .route("/entities/batch", web::post().to(batch_add_entities))
        .route("/entities/count", web::get().to(entity_count))
        .route("/entities/{id}", web::get().to(get_entity))
        .route("/entities/{id}", web::put().to(update_entity))
        .route("/entities/{id}", web::delete().to(delete_entity))
        .route("/entities/{id}/group", web::get().to(get_match_group))
        .route("/entities/{id}/group", web::post().to(match_group_with_options))
        .route("/match", web::post().to(match_entity))
        .route("/match/text", web::post().to(match_text))
        .route("/clusters/recompute", web::post().to(recompute_clusters));
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let vdb_healthy = match state.store.health().await {
        Ok(healthy) => healthy,
        Err(e) => {
            error!(error = %e, "vector store health check failed");
            false
        }
    };

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "vdb_healthy": vdb_healthy,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn add_entity(state: web::Data<AppState>, body: web::Json<EntityRecord>) -> HttpResponse {
    let entity = body.into_inner();

    if entity.vector.is_empty() {
        return bad_request("entity vector is required");
    }
    let expected = state.config.embedding.embedding_dim;
    if entity.vector.len() != expected {
        return bad_request(format!(
            "invalid vector dimension: expected {expected}, got {}",
            entity.vector.len()
        ));
    }

    match state.store.add(entity).await {
        Ok(id) => HttpResponse::Created().json(json!({ "id": id })),
        Err(e) => error_response(&e),
    }
}

async fn get_entity(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.store.get(&path.into_inner()).await {
        Ok(entity) => HttpResponse::Ok().json(entity),
        Err(e) => error_response(&e),
    }
}

async fn update_entity(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<EntityRecord>,
) -> HttpResponse {
    let mut entity = body.into_inner();
    entity.id = path.into_inner();

    let expected = state.config.embedding.embedding_dim;
    if !entity.vector.is_empty() && entity.vector.len() != expected {
        return bad_request(format!(
            "invalid vector dimension: expected {expected}, got {}",
            entity.vector.len()
        ));
    }

    match state.store.update(entity.clone()).await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "updated", "id": entity.id })),
        Err(e) => error_response(&e),
    }
}

async fn delete_entity(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match state.store.delete(&id).await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "deleted", "id": id })),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct BatchAddRequest {
    entities: Vec<EntityRecord>,
}

async fn batch_add_entities(
    state: web::Data<AppState>,
    body: web::Json<BatchAddRequest>,
) -> HttpResponse {
    let entities = body.into_inner().entities;
    if entities.is_empty() {
        return bad_request("no entities provided");
    }

    let expected = state.config.embedding.embedding_dim;
    for (i, entity) in entities.iter().enumerate() {
        if entity.vector.is_empty() {
            return bad_request(format!("entity at index {i} has no vector"));
        }
        if entity.vector.len() != expected {
            return bad_request(format!(
                "entity at index {i} has invalid vector dimension: expected {expected}, got {}",
                entity.vector.len()
            ));
        }
    }

    match state.store.batch_add(entities).await {
        Ok(ids) => HttpResponse::Created().json(json!({
            "status": "added",
            "count": ids.len(),
            "ids": ids,
        })),
        Err(e) => error_response(&e),
    }
}

async fn entity_count(state: web::Data<AppState>) -> HttpResponse {
    match state.service.entity_count().await {
        Ok(count) => HttpResponse::Ok().json(json!({ "count": count })),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct MatchEntityRequest {
    entity: EntityData,
    #[serde(default)]
    threshold: f32,
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    use_clustering: bool,
    #[serde(default)]
    include_scores: bool,
    #[serde(default)]
    field_weights: HashMap<String, f32>,
    #[serde(default)]
    field_type_mappings: HashMap<String, String>,
}

async fn match_entity(
    state: web::Data<AppState>,
    body: web::Json<MatchEntityRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let opts = MatchOptions {
        limit: request.limit,
        threshold: request.threshold,
        include_details: true,
        use_clustering: request.use_clustering,
        include_field_scores: request.include_scores,
        field_weights: request.field_weights,
        field_type_mappings: request.field_type_mappings,
        ..MatchOptions::default()
    };

    match state
        .service
        .find_matches_for_entity(&request.entity, &opts)
        .await
    {
        Ok(matches) => HttpResponse::Ok().json(json!({
            "count": matches.len(),
            "matches": matches,
        })),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct MatchTextRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    threshold: f32,
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    use_clustering: bool,
    #[serde(default)]
    include_scores: bool,
    #[serde(default)]
    field_weights: HashMap<String, f32>,
    #[serde(default)]
    field_type_mappings: HashMap<String, String>,
}

async fn match_text(
    state: web::Data<AppState>,
    body: web::Json<MatchTextRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    if request.text.is_empty() {
        return bad_request("text is required");
    }

    let opts = MatchOptions {
        limit: request.limit,
        threshold: request.threshold,
        include_details: true,
        use_clustering: request.use_clustering,
        include_field_scores: request.include_scores,
        field_weights: request.field_weights,
        field_type_mappings: request.field_type_mappings,
        ..MatchOptions::default()
    };

    match state.service.find_matches(&request.text, &opts).await {
        Ok(matches) => HttpResponse::Ok().json(json!({
            "count": matches.len(),
            "matches": matches,
        })),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct MatchGroupQuery {
    #[serde(default)]
    threshold: Option<f32>,
    #[serde(default)]
    max_size: Option<usize>,
    #[serde(default)]
    include_scores: Option<bool>,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    hops_limit: Option<usize>,
}

async fn get_match_group(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MatchGroupQuery>,
) -> HttpResponse {
    let query = query.into_inner();

    let strategy = match query.strategy.as_deref() {
        None | Some("") => GroupStrategy::default(),
        Some(raw) => match GroupStrategy::from_str(raw) {
            Ok(strategy) => strategy,
            Err(e) => return error_response(&e),
        },
    };

    let opts = MatchGroupOptions {
        threshold: query.threshold.unwrap_or_default(),
        max_size: query.max_size.unwrap_or_default(),
        include_scores: query.include_scores.unwrap_or_default(),
        strategy,
        hops_limit: query.hops_limit.unwrap_or_default(),
        field_weights: HashMap::new(),
    };

    match state.service.get_match_group(&path.into_inner(), &opts).await {
        Ok(group) => HttpResponse::Ok().json(group),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct MatchGroupRequest {
    #[serde(default)]
    threshold: f32,
    #[serde(default)]
    max_size: usize,
    #[serde(default)]
    include_scores: bool,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    hops_limit: usize,
    #[serde(default)]
    field_weights: HashMap<String, f32>,
}

async fn match_group_with_options(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MatchGroupRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    let strategy = match request.strategy.as_deref() {
        None | Some("") => GroupStrategy::default(),
        Some(raw) => match GroupStrategy::from_str(raw) {
            Ok(strategy) => strategy,
            Err(e) => return error_response(&e),
        },
    };

    let opts = MatchGroupOptions {
        threshold: request.threshold,
        max_size: request.max_size,
        include_scores: request.include_scores,
        strategy,
        hops_limit: request.hops_limit,
        field_weights: request.field_weights,
    };

    match state.service.get_match_group(&path.into_inner(), &opts).await {
        Ok(group) => HttpResponse::Ok().json(group),
        Err(e) => error_response(&e),
    }
}

async fn recompute_clusters(state: web::Data<AppState>) -> HttpResponse {
    if !state.config.clustering.enabled {
        return bad_request("clustering is not enabled in the current configuration");
    }

    let service = state.service.clone();
    actix_web::rt::spawn(async move {
        info!("started cluster recomputation");
        match service.recompute_clusters().await {
            Ok(updated) => info!(updated, "cluster recomputation finished"),
            Err(e) => error!(error = %e, "cluster recomputation failed"),
        }
    });

    HttpResponse::Accepted().json(json!({
        "status": "processing",
        "message": "Cluster recomputation started; it runs in the background and may take a while.",
    }))
}
