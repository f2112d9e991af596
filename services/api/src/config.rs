use crate::call::token::DEFAULT_TOKEN_TTL_SECS;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Application id the issued credentials are bound to.
    pub rtc_app_id: String,
    /// Credential signing secret. Left optional here; the token issuer
    /// rejects a missing secret when it is constructed at startup.
    pub rtc_app_secret: Option<String>,
    pub token_ttl_secs: u64,
    pub dialogue_api_key: String,
    pub dialogue_api_base: String,
    pub chat_model: String,
    pub tts_endpoint: String,
    pub tts_voice: String,
    /// Seconds between response-worker ticks.
    pub response_interval_secs: u64,
    pub log_level: Level,
    /// Optional path to a persona prompt file; a built-in default is used
    /// when unset.
    pub persona_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let rtc_app_id = std::env::var("RTC_APP_ID")
            .map_err(|_| ConfigError::MissingVar("RTC_APP_ID".to_string()))?;
        let rtc_app_secret = std::env::var("RTC_APP_SECRET").ok();

        let token_ttl_secs = parse_u64_var("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;

        let dialogue_api_key = std::env::var("DIALOGUE_API_KEY")
            .map_err(|_| ConfigError::MissingVar("DIALOGUE_API_KEY".to_string()))?;
        let dialogue_api_base = std::env::var("DIALOGUE_API_BASE")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());

        let tts_endpoint = std::env::var("TTS_ENDPOINT")
            .unwrap_or_else(|_| "http://127.0.0.1:5002/api/tts".to_string());
        let tts_voice =
            std::env::var("TTS_VOICE").unwrap_or_else(|_| "en-US-JennyNeural".to_string());

        let response_interval_secs = parse_u64_var("RESPONSE_INTERVAL_SECS", 10)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let persona_path = std::env::var("PERSONA_PATH").map(PathBuf::from).ok();

        Ok(Self {
            bind_address,
            rtc_app_id,
            rtc_app_secret,
            token_ttl_secs,
            dialogue_api_key,
            dialogue_api_base,
            chat_model,
            tts_endpoint,
            tts_voice,
            response_interval_secs,
            log_level,
            persona_path,
        })
    }
}

/// Parses a positive integer variable. Zero is rejected: a zero TTL would
/// issue already-expired credentials and a zero interval cannot drive a
/// timer.
fn parse_u64_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?,
        Err(_) => default,
    };
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}
