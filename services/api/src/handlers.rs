//! Axum Handlers for the REST API
//!
//! This module contains the logic for the call-command endpoints: issuing
//! caller credentials, summoning the agent into a channel, inspecting a
//! call, and tearing one down. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::{
    call::{CallError, CallSession, JoinOutcome, Role, token::TokenError},
    models::{
        CallAck, CallStatusResponse, ErrorResponse, StartCallRequest, StartCallResponse,
        TokenRequest, TokenResponse,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn map_token_error(err: TokenError) -> ApiError {
    match err {
        TokenError::MissingSecret => {
            ApiError::ServiceUnavailable("Credential signing is not configured.".to_string())
        }
        other => ApiError::InternalServerError(other.into()),
    }
}

fn map_call_error(err: CallError) -> ApiError {
    match err {
        CallError::Token(e) => map_token_error(e),
        CallError::Transport(e) => ApiError::BadGateway(e.to_string()),
    }
}

/// Issue a join credential for a human caller.
#[utoipa::path(
    post,
    path = "/calls/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Credential issued", body = TokenResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 503, description = "Credential signing not configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if payload.channel.is_empty() {
        return Err(ApiError::BadRequest("channel must not be empty".to_string()));
    }

    // The caller's in-channel identity is chosen here, not by the issuer.
    let uid = rand::rng().random_range(1..=u32::MAX);
    let credential = state
        .issuer
        .issue(&payload.channel, uid, Role::Publisher)
        .map_err(map_token_error)?;

    Ok(Json(TokenResponse {
        token: credential.token,
        channel: credential.channel,
        uid,
    }))
}

/// Summon the agent into a channel.
///
/// Idempotent: starting a call that is already running acknowledges with
/// `already_active` instead of failing.
#[utoipa::path(
    post,
    path = "/calls",
    request_body = StartCallRequest,
    responses(
        (status = 201, description = "Agent is joining the channel", body = StartCallResponse),
        (status = 200, description = "Agent already on the call", body = StartCallResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 502, description = "Transport rejected the join", body = ErrorResponse),
        (status = 503, description = "Credential signing not configured", body = ErrorResponse)
    )
)]
pub async fn start_call(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartCallRequest>,
) -> Result<Response, ApiError> {
    if payload.channel.is_empty() {
        return Err(ApiError::BadRequest("channel must not be empty".to_string()));
    }

    let (session, is_new) = state
        .registry
        .get_or_create(&payload.channel, || {
            CallSession::spawn(
                payload.channel.clone(),
                state.issuer.clone(),
                state.transport_factory.as_ref(),
                &state.registry,
                state.pipeline.clone(),
                Duration::from_secs(state.config.response_interval_secs),
            )
        })
        .await;

    if !is_new {
        return Ok((
            StatusCode::OK,
            Json(StartCallResponse {
                status: CallAck::AlreadyActive,
                channel: payload.channel,
            }),
        )
            .into_response());
    }

    match session.join().await {
        Ok(JoinOutcome::Started | JoinOutcome::AlreadyActive) => Ok((
            StatusCode::CREATED,
            Json(StartCallResponse {
                status: CallAck::Joined,
                channel: payload.channel,
            }),
        )
            .into_response()),
        Err(e) => {
            // The fresh session never made it into the call; drop it so the
            // next start-call builds a clean one.
            session.discard().await;
            Err(map_call_error(e))
        }
    }
}

/// Get the current state of a call.
#[utoipa::path(
    get,
    path = "/calls/{channel}",
    responses(
        (status = 200, description = "Call state", body = CallStatusResponse),
        (status = 404, description = "No active call for this channel", body = ErrorResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel id")
    )
)]
pub async fn call_status(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<CallStatusResponse>, ApiError> {
    let session = state.registry.get(&channel).await.ok_or_else(|| {
        ApiError::NotFound(format!("No active call for channel '{}'", channel))
    })?;

    Ok(Json(CallStatusResponse {
        channel,
        state: session.state().await,
        peer_present: session.peer_uid().await.is_some(),
        created_at: session.created_at(),
    }))
}

/// End a call and discard its session.
///
/// This is also the operational force-reset path: the session is removed
/// even when the transport leave fails, and that failure is reported.
#[utoipa::path(
    delete,
    path = "/calls/{channel}",
    responses(
        (status = 204, description = "Call ended"),
        (status = 404, description = "No active call for this channel", body = ErrorResponse),
        (status = 502, description = "Transport leave failed; session removed anyway", body = ErrorResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel id")
    )
)]
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state.registry.get(&channel).await.ok_or_else(|| {
        ApiError::NotFound(format!("No active call for channel '{}'", channel))
    })?;

    session.leave().await.map_err(map_call_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::transport::testing::FakeTransportFactory;
    use crate::call::worker::testing::noop_pipeline;
    use crate::call::{CallState, SessionRegistry, TokenIssuer};
    use crate::config::Config;
    use tracing::Level;

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:3000".parse().unwrap(),
            rtc_app_id: "test-app".to_string(),
            rtc_app_secret: Some("test-secret".to_string()),
            token_ttl_secs: 3600,
            dialogue_api_key: "test-key".to_string(),
            dialogue_api_base: "http://localhost/v1".to_string(),
            chat_model: "test-model".to_string(),
            tts_endpoint: "http://localhost/api/tts".to_string(),
            tts_voice: "test-voice".to_string(),
            // Keep the spawned workers dormant while the tests run.
            response_interval_secs: 3600,
            log_level: Level::INFO,
            persona_path: None,
        }
    }

    fn test_state(secret: Option<&str>) -> Arc<AppState> {
        let config = test_config();
        Arc::new(AppState {
            registry: Arc::new(SessionRegistry::new()),
            issuer: Arc::new(TokenIssuer::new(
                &config.rtc_app_id,
                secret,
                config.token_ttl_secs,
            )),
            pipeline: noop_pipeline(),
            transport_factory: Arc::new(FakeTransportFactory::default()),
            config: Arc::new(config),
        })
    }

    #[tokio::test]
    async fn issued_token_decodes_to_the_requested_channel() {
        let state = test_state(Some("test-secret"));
        let Json(response) = issue_token(
            State(state.clone()),
            Json(TokenRequest {
                channel: "c1".to_string(),
            }),
        )
        .await
        .unwrap();

        let claims = state.issuer.decode(&response.token).unwrap();
        assert_eq!(claims.channel, "c1");
        assert_eq!(claims.uid, response.uid);
        assert!(response.uid > 0);
    }

    #[tokio::test]
    async fn missing_signing_material_is_service_unavailable() {
        let state = test_state(None);
        let result = issue_token(
            State(state),
            Json(TokenRequest {
                channel: "c1".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn start_call_is_idempotent() {
        let state = test_state(Some("test-secret"));

        let first = start_call(
            State(state.clone()),
            Json(StartCallRequest {
                channel: "abc".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = start_call(
            State(state.clone()),
            Json(StartCallRequest {
                channel: "abc".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(state.registry.len().await, 1);
    }

    #[tokio::test]
    async fn start_call_without_signing_material_leaves_no_session_behind() {
        let state = test_state(None);
        let result = start_call(
            State(state.clone()),
            Json(StartCallRequest {
                channel: "abc".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::ServiceUnavailable(_))));
        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn end_call_removes_the_session() {
        let state = test_state(Some("test-secret"));
        start_call(
            State(state.clone()),
            Json(StartCallRequest {
                channel: "abc".to_string(),
            }),
        )
        .await
        .unwrap();

        let status = end_call(State(state.clone()), Path("abc".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn end_call_for_an_unknown_channel_is_not_found() {
        let state = test_state(Some("test-secret"));
        let result = end_call(State(state), Path("missing".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn call_status_reflects_the_session() {
        let state = test_state(Some("test-secret"));
        start_call(
            State(state.clone()),
            Json(StartCallRequest {
                channel: "abc".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(status) = call_status(State(state.clone()), Path("abc".to_string()))
            .await
            .unwrap();
        assert_eq!(status.channel, "abc");
        assert!(matches!(
            status.state,
            CallState::Joining | CallState::Joined
        ));
        assert!(!status.peer_present);
    }
}
