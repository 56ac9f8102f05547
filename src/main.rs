use anyhow::Result;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use services::{
    llm_agent::{CompletionClient, LlmAgent, OpenAiCompletions},
    summary_cache::SummaryCache,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::Config::new()?;
    tracing::info!("Loaded configuration: {:?}", config);
    config.ensure_upload_dir()?;

    let http = reqwest::Client::new();
    let completions = Arc::new(OpenAiCompletions::new(
        http.clone(),
        &config.api_key,
        &config.api_base,
    ));
    let state = Arc::new(AppState::new(config, http, completions));

    let app = routes::router(state.clone()).layer(TraceLayer::new_for_http());

    let addr = state.config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

// Application state, shared read-only across requests
pub struct AppState {
    config: config::Config,
    http: reqwest::Client,
    agent: LlmAgent,
    summaries: SummaryCache,
}

impl AppState {
    fn new(
        config: config::Config,
        http: reqwest::Client,
        completions: Arc<dyn CompletionClient>,
    ) -> Self {
        let agent = LlmAgent::new(completions, &config.chat_model, &config.vision_model);
        let summaries = SummaryCache::new(config.summary_cache_capacity);
        Self {
            config,
            http,
            agent,
            summaries,
        }
    }
}
