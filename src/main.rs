use std::error::Error;
use std::sync::Arc;

use hybrid_store::{HybridRetrievalEngine, RetrievalConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env is fine, the process environment may carry everything.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,hybrid_store=info"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cfg = RetrievalConfig::from_env()?;
    info!(
        "Starting retrieval engine: qdrant={} embeddings={} ({}) mode={:?}",
        cfg.qdrant_url, cfg.embedding.endpoint, cfg.embedding.model, cfg.retrieval_mode
    );

    let engine = Arc::new(HybridRetrievalEngine::connect(cfg)?);
    info!(
        "Retrieval engine ready, store cache capacity={}",
        engine.config().cache.capacity
    );

    shutdown_signal().await?;
    info!(
        "Shutting down, {} store handles cached",
        engine.stores().len()
    );

    Ok(())
}

/// Resolves when Ctrl+C is pressed.
async fn shutdown_signal() -> std::io::Result<()> {
    signal::ctrl_c().await
}
