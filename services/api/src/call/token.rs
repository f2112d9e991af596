//! Join-credential issuance for the voice channel.
//!
//! Credentials are short-lived HS256-signed claims binding a subject
//! identity to a channel and a role. They are never persisted; a caller
//! presents one to the transport when joining.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Seconds a credential stays valid unless the caller overrides it.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Reserved subject identity the agent uses when it joins as the bot.
pub const AGENT_UID: u32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Signing material was not configured; no credential can be issued.
    /// The material is resolved once at issuer construction, not re-read
    /// per request.
    #[error("credential signing material is not configured")]
    MissingSecret,
    /// The signing operation itself failed.
    #[error("failed to sign credential: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    /// A presented credential did not validate against this issuer.
    #[error("credential failed validation: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Scope a credential grants within the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May send audio into the channel.
    Publisher,
    /// May only receive.
    Subscriber,
}

/// Claims carried by a signed join credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelClaims {
    /// Issuing application id.
    pub iss: String,
    /// Subject identity within the channel.
    pub uid: u32,
    /// Channel the credential grants access to.
    pub channel: String,
    pub role: Role,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds. Always `iat` plus the requested TTL.
    pub exp: i64,
}

/// An issued credential. Immutable once issued.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub channel: String,
    pub uid: u32,
    pub role: Role,
    pub expires_at: i64,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and validates join credentials for one application id.
pub struct TokenIssuer {
    app_id: String,
    keys: Option<SigningKeys>,
    ttl_secs: u64,
}

impl TokenIssuer {
    /// Builds an issuer from the configured signing secret.
    ///
    /// Absent or empty signing material is resolved here, once, at startup;
    /// every later `issue` then reports `MissingSecret` without re-reading
    /// configuration, and the service surfaces it as unavailable.
    pub fn new(app_id: &str, secret: Option<&str>, ttl_secs: u64) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| SigningKeys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });
        Self {
            app_id: app_id.to_string(),
            keys,
            ttl_secs,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    fn keys(&self) -> Result<&SigningKeys, TokenError> {
        self.keys.as_ref().ok_or(TokenError::MissingSecret)
    }

    /// Issues a credential for `uid` in `channel` with the configured TTL.
    pub fn issue(&self, channel: &str, uid: u32, role: Role) -> Result<Credential, TokenError> {
        self.issue_with_ttl(channel, uid, role, self.ttl_secs)
    }

    pub fn issue_with_ttl(
        &self,
        channel: &str,
        uid: u32,
        role: Role,
        ttl_secs: u64,
    ) -> Result<Credential, TokenError> {
        let keys = self.keys()?;
        let iat = Utc::now().timestamp();
        let claims = ChannelClaims {
            iss: self.app_id.clone(),
            uid,
            channel: channel.to_string(),
            role,
            iat,
            exp: iat + ttl_secs as i64,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?;
        Ok(Credential {
            token,
            channel: claims.channel,
            uid,
            role,
            expires_at: claims.exp,
        })
    }

    /// Decodes and validates a credential previously issued by this issuer.
    pub fn decode(&self, token: &str) -> Result<ChannelClaims, TokenError> {
        let keys = self.keys()?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.app_id]);
        let data = decode::<ChannelClaims>(token, &keys.decoding, &validation)
            .map_err(TokenError::Invalid)?;
        Ok(data.claims)
    }
}
