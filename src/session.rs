//! Process-wide authentication session state.
//!
//! The session is owned by a [`SessionStore`] and is only ever replaced or
//! cleared as a whole value. Nothing mutates individual fields in place, so
//! a renewed access token can never be observed alongside a stale expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::ServiceError;

/// Role carried by the authenticated session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

/// Authenticated session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    /// Whether the user opted into silent renewal ("keep me signed in").
    pub keep_session: bool,
    pub role: Role,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True when this session qualifies for a silent renewal attempt.
    pub fn is_renewable(&self) -> bool {
        self.keep_session && !self.refresh_token.is_empty()
    }
}

/// Holder for the process-wide session.
///
/// Writers swap the entire `Option<Session>`; partial updates are not
/// expressible through this API.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Atomically installs a new session.
    pub async fn replace(&self, session: Session) {
        *self.inner.write().await = Some(session);
    }

    /// Atomically clears token, refresh token, expiry and role together.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

/// Reads the `exp` claim from an access token without verifying it.
///
/// The backend signs its tokens; this side only needs the expiry to decide
/// whether a request may be dispatched, so the payload is decoded directly.
pub fn decode_expiry(access_token: &str) -> Result<DateTime<Utc>, ServiceError> {
    #[derive(Deserialize)]
    struct ExpClaim {
        exp: i64,
    }

    let payload = access_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ServiceError::AuthError("malformed access token".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| ServiceError::AuthError("malformed access token payload".into()))?;
    let claims: ExpClaim = serde_json::from_slice(&bytes)
        .map_err(|_| ServiceError::AuthError("access token is missing an exp claim".into()))?;

    Utc.timestamp_opt(claims.exp, 0)
        .single()
        .ok_or_else(|| ServiceError::AuthError("access token exp claim out of range".into()))
}
