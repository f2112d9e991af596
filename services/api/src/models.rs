//! API Models
//!
//! Request and response payloads for the call endpoints, annotated for
//! OpenAPI generation with `utoipa`.

use crate::call::CallState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct TokenRequest {
    /// Channel the caller wants to join.
    #[schema(example = "64f1c0ffee5ca11ab1e0b0d1")]
    pub channel: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub channel: String,
    /// Subject identity assigned to the caller within the channel.
    pub uid: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct StartCallRequest {
    /// Channel the agent should join.
    #[schema(example = "64f1c0ffee5ca11ab1e0b0d1")]
    pub channel: String,
}

/// Acknowledgement of a start-call request.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallAck {
    /// The agent is joining the channel.
    Joined,
    /// The agent was already on the call.
    AlreadyActive,
}

#[derive(Serialize, ToSchema)]
pub struct StartCallResponse {
    pub status: CallAck,
    pub channel: String,
}

#[derive(Serialize, ToSchema)]
pub struct CallStatusResponse {
    pub channel: String,
    #[schema(example = "joined")]
    pub state: CallState,
    pub peer_present: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ack_serialization() {
        assert_eq!(
            serde_json::to_string(&CallAck::Joined).unwrap(),
            "\"joined\""
        );
        assert_eq!(
            serde_json::to_string(&CallAck::AlreadyActive).unwrap(),
            "\"already_active\""
        );
    }

    #[test]
    fn test_call_state_serialization() {
        assert_eq!(serde_json::to_string(&CallState::Idle).unwrap(), "\"idle\"");
        assert_eq!(
            serde_json::to_string(&CallState::Joining).unwrap(),
            "\"joining\""
        );
        assert_eq!(
            serde_json::to_string(&CallState::Joined).unwrap(),
            "\"joined\""
        );
        assert_eq!(
            serde_json::to_string(&CallState::Leaving).unwrap(),
            "\"leaving\""
        );
    }

    #[test]
    fn test_token_request_deserialization() {
        let request: TokenRequest = serde_json::from_str(r#"{"channel": "c1"}"#).unwrap();
        assert_eq!(request.channel, "c1");

        let missing: Result<TokenRequest, _> = serde_json::from_str(r#"{}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse {
            token: "signed-token".to_string(),
            channel: "c1".to_string(),
            uid: 12345,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("signed-token"));
        assert!(json.contains("\"uid\":12345"));
    }

    #[test]
    fn test_start_call_response_serialization() {
        let response = StartCallResponse {
            status: CallAck::AlreadyActive,
            channel: "c1".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"already_active","channel":"c1"}"#);
    }

    #[test]
    fn test_call_status_response_serialization() {
        let response = CallStatusResponse {
            channel: "c1".to_string(),
            state: CallState::Joined,
            peer_present: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"state\":\"joined\""));
        assert!(json.contains("\"peer_present\":true"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Call not found".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"message":"Call not found"}"#
        );
    }
}
