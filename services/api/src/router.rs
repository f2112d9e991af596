//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the call endpoints and OpenAPI documentation.

use crate::{
    call::CallState,
    handlers,
    models::{
        CallAck, CallStatusResponse, ErrorResponse, StartCallRequest, StartCallResponse,
        TokenRequest, TokenResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::issue_token,
        handlers::start_call,
        handlers::call_status,
        handlers::end_call,
    ),
    components(
        schemas(TokenRequest, TokenResponse, StartCallRequest, StartCallResponse, CallStatusResponse, ErrorResponse, CallAck, CallState)
    ),
    tags(
        (name = "Parley API", description = "Call orchestration for the Parley voice agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/calls/token", post(handlers::issue_token))
        .route("/calls", post(handlers::start_call))
        .route(
            "/calls/{channel}",
            get(handlers::call_status).delete(handlers::end_call),
        )
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
