use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use resolve::prelude::*;
use resolve_api::AppState;

/// Approximate entity resolution over a vector store
#[derive(Parser, Debug)]
#[command(name = "resolve")]
#[command(version)]
#[command(about = "Approximate entity resolution engine", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run the HTTP API server
    #[arg(long)]
    serve: bool,

    /// Ingest entities from a JSON file
    #[arg(long, value_name = "FILE")]
    ingest: Option<PathBuf>,

    /// Find matches for a query string
    #[arg(long = "match", value_name = "TEXT")]
    match_text: Option<String>,

    /// Find matches for the entity in a JSON file
    #[arg(long = "match-file", value_name = "FILE")]
    match_file: Option<PathBuf>,

    /// Minimum similarity score (0-1); 0 uses the configured default
    #[arg(long, default_value_t = 0.0)]
    threshold: f32,

    /// Maximum number of matches to return; 0 uses the configured default
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Include match details in the output
    #[arg(long)]
    details: bool,

    /// Include per-field similarity scores
    #[arg(long = "field-scores")]
    field_scores: bool,

    /// Recompute blocking clusters for all stored entities
    #[arg(long = "recompute-clusters")]
    recompute_clusters: bool,

    /// Resolve the match group around the given entity id
    #[arg(long, value_name = "ID")]
    group: Option<String>,

    /// Group strategy: direct, transitive or hybrid
    #[arg(long = "group-strategy", default_value = "hybrid")]
    group_strategy: String,

    /// Maximum transitive hops for group resolution
    #[arg(long = "group-hops", default_value_t = 2)]
    group_hops: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn has_command(&self) -> bool {
        self.serve
            || self.ingest.is_some()
            || self.match_text.is_some()
            || self.match_file.is_some()
            || self.recompute_clusters
            || self.group.is_some()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !args.has_command() {
        anyhow::bail!("no command specified; try --help");
    }

    let config = Arc::new(
        Config::load(Some(args.config.as_path())).context("failed to load configuration")?,
    );

    let embedder: Arc<dyn EmbeddingService> = Arc::new(
        HttpEmbeddingClient::new(&config.embedding)
            .context("failed to initialize embedding client")?,
    );
    let store: Arc<dyn VectorStore> = Arc::new(
        HttpVectorStore::new(&config.vector_store, config.embedding.embedding_dim)
            .context("failed to initialize vector store client")?,
    );

    let healthy = store
        .health()
        .await
        .context("failed to reach the vector store")?;
    if !healthy {
        anyhow::bail!("vector store is not healthy");
    }

    let service = Arc::new(MatchService::new(config.clone(), store.clone(), embedder));

    if let Some(path) = &args.ingest {
        run_ingest(&service, path, config.embedding.batch_size).await?;
    }

    if let Some(path) = &args.match_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let entity: EntityData =
            serde_json::from_str(&raw).context("failed to parse match file")?;

        info!(id = ?entity.id, "searching for matches");
        let matches = service
            .find_matches_for_entity(&entity, &match_options(&args))
            .await?;
        print_matches(&matches)?;
    }

    if let Some(text) = &args.match_text {
        info!("searching for matches");
        let matches = service.find_matches(text, &match_options(&args)).await?;
        print_matches(&matches)?;
    }

    if args.recompute_clusters {
        info!("recomputing clusters");
        let updated = service.recompute_clusters().await?;
        info!(updated, "cluster recomputation finished");
    }

    if let Some(entity_id) = &args.group {
        let opts = MatchGroupOptions {
            threshold: args.threshold,
            max_size: args.limit,
            include_scores: args.field_scores,
            strategy: args.group_strategy.parse::<GroupStrategy>()?,
            hops_limit: args.group_hops,
            field_weights: Default::default(),
        };
        let group = service.get_match_group(entity_id, &opts).await?;
        println!("{}", serde_json::to_string_pretty(&group)?);
    }

    if args.serve {
        serve(config, store, service).await?;
    }

    Ok(())
}

fn match_options(args: &Args) -> MatchOptions {
    MatchOptions {
        limit: args.limit,
        threshold: args.threshold,
        include_details: args.details,
        include_field_scores: args.field_scores,
        ..MatchOptions::default()
    }
}

fn print_matches(matches: &[MatchResult]) -> anyhow::Result<()> {
    if matches.is_empty() {
        println!("No matches found.");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(matches)?);
    Ok(())
}

/// Ingest a JSON array of entities, batching writes with a deadline per
/// batch.
async fn run_ingest(
    service: &Arc<MatchService>,
    path: &PathBuf,
    batch_size: usize,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entities: Vec<EntityData> =
        serde_json::from_str(&raw).context("failed to parse ingest file")?;

    info!(count = entities.len(), "ingesting entities");
    let started = std::time::Instant::now();

    let batch_size = batch_size.max(1);
    let mut ingested = 0usize;
    for batch in entities.chunks(batch_size) {
        tokio::time::timeout(
            Duration::from_secs(60),
            service.add_entities(batch.to_vec()),
        )
        .await
        .map_err(|_| anyhow::anyhow!("ingest batch timed out after {ingested} entities"))??;

        ingested += batch.len();
        info!(ingested, "progress");
    }

    info!(
        count = ingested,
        elapsed_secs = format!("{:.2}", started.elapsed().as_secs_f64()),
        "ingest finished"
    );
    Ok(())
}

/// Run the API server until interrupted.
async fn serve(
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    service: Arc<MatchService>,
) -> anyhow::Result<()> {
    info!("starting Resolve v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState {
        config: config.clone(),
        store,
        service,
    };

    let http_handle = std::thread::spawn(move || {
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = resolve_api::run(state).await {
                eprintln!("HTTP server error: {e}");
            }
        })
    });

    info!(
        "API listening on http://{}:{}",
        config.api.host, config.api.port
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("shutting down");
    Ok(())
}
