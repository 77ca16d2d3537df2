pub mod config;
pub mod errors;
pub mod llm;
pub mod perception;
pub mod server;
pub mod steps;

use std::sync::Arc;

use crate::errors::ScribeResult;
use crate::llm::registry::ProviderRegistry;
use crate::server::AppState;
use crate::steps::cache::{JsonFileStore, StepCache};
use crate::steps::journey::JourneyAggregator;
use crate::steps::service::DescriptionService;

/// Process entry: logging, config, backend selection, store, then the HTTP server.
pub async fn run() -> ScribeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cfg = config::load_config()?;

    let registry = ProviderRegistry::from_config(&cfg.llm)?;
    let (backend, call) = registry.active()?;
    tracing::info!(
        provider = registry.active_name(),
        model = %call.model,
        available = ?registry.list_names(),
        "model backend selected"
    );

    let store = JsonFileStore::new(cfg.store.resolved_path());
    tracing::info!(path = %store.path().display(), "step store");
    let cache: Arc<dyn StepCache> = Arc::new(store);

    let state = Arc::new(AppState {
        steps: DescriptionService::new(
            backend.clone(),
            call.clone(),
            cache,
            cfg.annotation.clone(),
            cfg.prompts.step.clone(),
        ),
        journeys: JourneyAggregator::new(backend, call, cfg.prompts.journey.clone()),
        provider: registry.active_name().to_string(),
    });

    server::serve(state, &cfg.server.bind).await
}
