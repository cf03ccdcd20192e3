//! HTTP façade for the resume-to-job matcher.
//!
//! Serves three endpoints: `GET /health`, `POST /index/build` and
//! `POST /search`. An initial index build runs at startup on a best-effort
//! basis; if it fails the service still comes up and `/index/build` can be
//! retried once the corpus is fixed.

mod http;

use anyhow::{Context, Result};
use clap::Parser;
use http::{handle, AppState};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};
use matcher_indexer::{IndexBuilder, JsonCorpus};
use matcher_search::{KeywordClassifier, QueryEngine};
use matcher_vector_store::{EmbeddingModel, SnapshotCell};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "matcher-server")]
#[command(about = "Semantic resume-to-job matching service", long_about = None)]
#[command(version)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8001")]
    bind: SocketAddr,

    /// Path to the job corpus (JSON array of postings).
    #[arg(long, default_value = "data/jobs.json")]
    corpus: PathBuf,

    /// Embedding model id; defaults to MATCHER_EMBEDDING_MODEL or the stock model.
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .filter_module("ort", log::LevelFilter::Off) // Silence ONNX Runtime
        .init();

    let args = Args::parse();

    let embedder = Arc::new(match args.model.as_deref() {
        Some(model) => EmbeddingModel::new_for_model(model)?,
        None => EmbeddingModel::new()?,
    });
    log::info!(
        "Embedding model '{}' ready (dimension {})",
        embedder.model_id(),
        embedder.dimension()
    );

    let classifier = Arc::new(KeywordClassifier::new());
    let snapshots = Arc::new(SnapshotCell::new());
    let state = Arc::new(AppState {
        engine: QueryEngine::new(embedder.clone(), classifier.clone(), snapshots.clone()),
        builder: IndexBuilder::new(embedder, classifier, snapshots),
        corpus: Box::new(JsonCorpus::new(&args.corpus)),
    });

    match state.builder.build(state.corpus.as_ref()).await {
        Ok(stats) => log::info!(
            "Initial index built: {} records in {}ms",
            stats.count,
            stats.duration_ms
        ),
        Err(err) => log::warn!("Initial index build failed, starting without an index: {err}"),
    }

    let service_state = state.clone();
    let make_service = make_service_fn(move |_| {
        let state = service_state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle(state, req).await) }
            }))
        }
    });

    log::info!("Listening on http://{}", args.bind);
    Server::bind(&args.bind)
        .serve(make_service)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
