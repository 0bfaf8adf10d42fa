pub mod api;
pub mod audit;
pub mod config;
pub mod consultation;
pub mod cookies;
pub mod core_state;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod translation;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError};
use crate::core_state::{CoreError, CoreState};
use crate::pipeline::llm::{LlmError, OpenAiClient};

/// Startup and serve failures surfaced by `run`.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),
    #[error("State initialization error: {0}")]
    Core(#[from] CoreError),
    #[error(transparent)]
    Server(#[from] api::ServerError),
}

pub async fn run() -> Result<(), RunError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = Config::from_env()?;
    if config.llm.api_key.is_empty() {
        tracing::warn!("LLM_API_KEY is empty; model calls will likely be rejected");
    }
    if config.identity_api_key.is_none() {
        tracing::warn!("IDENTITY_API_KEY is unset; no sessions can be opened");
    }

    let llm = Arc::new(OpenAiClient::new(&config.llm)?);
    tracing::info!(
        model = %config.llm.model,
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let core = Arc::new(CoreState::new(config, llm)?);
    api::serve_until_ctrl_c(core).await?;

    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
