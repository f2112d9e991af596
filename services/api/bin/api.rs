//! Main Entrypoint for the Parley API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the token issuer and the response-pipeline collaborators.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use parley_api::{
    call::{LoopbackTransportFactory, ResponsePipeline, SessionRegistry, TokenIssuer},
    config::Config,
    router::create_router,
    state::AppState,
};
use parley_core::{
    capture::FixedUtteranceCapture,
    dialogue::OpenAICompatibleClient,
    speech::HttpTtsClient,
};
use std::{fs, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Persona used when no prompt file is configured.
const DEFAULT_PERSONA: &str = "You are a candidate's stand-in on a live screening call. \
Answer the recruiter's questions about the candidate's background briefly and in a \
natural spoken register, without lists or markup.";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let issuer = Arc::new(TokenIssuer::new(
        &config.rtc_app_id,
        config.rtc_app_secret.as_deref(),
        config.token_ttl_secs,
    ));
    if !issuer.is_configured() {
        warn!("RTC_APP_SECRET is not set; credential issuance and call joins will be unavailable");
    }

    let persona_prompt = match &config.persona_path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read persona prompt from {}", path.display()))?,
        None => DEFAULT_PERSONA.to_string(),
    };

    let dialogue_config = OpenAIConfig::new()
        .with_api_key(&config.dialogue_api_key)
        .with_api_base(&config.dialogue_api_base);
    let pipeline = ResponsePipeline {
        capture: Arc::new(FixedUtteranceCapture::default()),
        dialogue: Arc::new(OpenAICompatibleClient::new(
            dialogue_config,
            config.chat_model.clone(),
            persona_prompt,
        )),
        tts: Arc::new(HttpTtsClient::new(
            config.tts_endpoint.clone(),
            config.tts_voice.clone(),
        )),
    };

    let app_state = Arc::new(AppState {
        registry: Arc::new(SessionRegistry::new()),
        issuer,
        pipeline,
        transport_factory: Arc::new(LoopbackTransportFactory),
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        model = %config.chat_model,
        bind_address = %config.bind_address,
        response_interval_secs = config.response_interval_secs,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
