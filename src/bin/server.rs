//! HTTP server for hybrid-sentiment-router
//!
//! Serves the web API with the lexicon fast predictor and either a remote
//! accurate model or the boosted placeholder.
//!
//! ## Environment Variables
//!
//! - `HYBRID_SENTIMENT_CONFIG`: path to a TOML config file (defaults apply if unset)
//! - `ACCURATE_MODEL_URL`: base URL of a remote model server for the accurate path
//! - `LOG_FORMAT=json`: structured JSON output
//! - `RUST_LOG=info`: log level filter

use std::path::Path;
use std::sync::Arc;

use hybrid_sentiment_router::config::loader::load_from_file;
use hybrid_sentiment_router::config::LogFormat;
use hybrid_sentiment_router::{
    init_tracing_with, metrics, web_api, BatchCoordinator, BoostedPredictor, HttpPredictor,
    HybridOrchestrator, LexiconPredictor, Predictor, ServiceConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match std::env::var("HYBRID_SENTIMENT_CONFIG") {
        Ok(path) => load_from_file(Path::new(&path))?,
        Err(_) => ServiceConfig::default(),
    };

    // LOG_FORMAT from the environment wins over the config file.
    let _ = init_tracing_with(LogFormat::from_env_or(config.observability.log_format));
    metrics::init_metrics()?;

    let fast: Arc<dyn Predictor> = Arc::new(LexiconPredictor::new());
    let accurate: Arc<dyn Predictor> = match std::env::var("ACCURATE_MODEL_URL") {
        Ok(url) => {
            info!(url = %url, "Using remote accurate model");
            Arc::new(HttpPredictor::new(url).with_name("remote_accurate"))
        }
        Err(_) => Arc::new(BoostedPredictor::new(Arc::new(LexiconPredictor::new()))),
    };

    let orchestrator = Arc::new(HybridOrchestrator::from_config(fast, accurate, &config)?);
    let coordinator = Arc::new(BatchCoordinator::with_config(
        orchestrator,
        config.batch.clone(),
    ));

    web_api::start_server(config.server, coordinator).await
}
