//! Demo binary for hybrid-sentiment-router
//!
//! Routes a fixed set of review texts through the lexicon fast predictor and
//! the boosted accurate predictor, logging each verdict, then runs the same
//! texts as one batch and logs the summary.
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json`: structured JSON output (production)
//! - `RUST_LOG=info`: log level filter (default: info)

use std::sync::Arc;

use hybrid_sentiment_router::{
    init_tracing, metrics, BatchCoordinator, BoostedPredictor, HybridOrchestrator,
    LexiconPredictor, Predictor, RoutingConfig, RoutingPolicy,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = init_tracing();
    metrics::init_metrics()?;

    info!("Starting hybrid-sentiment-router demo");

    let fast: Arc<dyn Predictor> = Arc::new(LexiconPredictor::new());
    let accurate: Arc<dyn Predictor> =
        Arc::new(BoostedPredictor::new(Arc::new(LexiconPredictor::new())));
    let policy = RoutingPolicy::new(RoutingConfig::default())?;
    let orchestrator = Arc::new(HybridOrchestrator::new(fast, accurate, policy));

    let long_text = format!("Очень длинный текст {}", "очень ".repeat(50));
    let demo_texts: Vec<(&str, String)> = vec![
        ("simple positive", "Отличный товар!".to_string()),
        ("simple negative", "Плохое качество.".to_string()),
        ("very long text", long_text),
        (
            "contrastive",
            "Это не плохо, а очень даже хорошо, но есть нюансы...".to_string(),
        ),
        (
            "uncertainty",
            "Возможно, это хороший товар, но я не уверен.".to_string(),
        ),
        (
            "sarcasm",
            "Сарказм? Да, конечно, отличное качество...".to_string(),
        ),
        (
            "mixed punctuation",
            "Неплохо, но могло быть и лучше! А почему так дорого?".to_string(),
        ),
        ("double negation", "Не без оснований".to_string()),
    ];

    for (description, text) in &demo_texts {
        let result = orchestrator.analyze(text).await;
        match result.analysis() {
            Some(a) => info!(
                case = %description,
                model = %a.model_used,
                reason = %a.routing.reason,
                complexity = a.routing.complexity.as_ref().map_or(0.0, |c| c.value),
                length = a.sample.length,
                words = a.sample.word_count,
                label = %a.prediction.label,
                confidence = a.prediction.confidence,
                "Routed"
            ),
            None => warn!(case = %description, error = ?result.error, "Analysis failed"),
        }
    }

    let coordinator = BatchCoordinator::new(Arc::clone(&orchestrator));
    let texts = demo_texts.into_iter().map(|(_, text)| text).collect();
    let report = coordinator.analyze_batch(texts).await?;

    info!(
        summary = %serde_json::to_string(&report.summary)?,
        "Demo complete"
    );

    Ok(())
}
