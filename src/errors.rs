use thiserror::Error;

/// Fixed fallback shown when no server-provided message is available.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Message surfaced when the link payment flow is attempted from a
/// Safari-family browser.
pub const UNSUPPORTED_BROWSER_MESSAGE: &str =
    "Link payments are not supported in Safari. Please use Chrome to complete your purchase.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    /// The stored access token is past its expiry, or the backend rejected
    /// it and renewal was not possible. The session has been cleared.
    #[error("Session expired")]
    SessionExpired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status transition: {0}")]
    InvalidStatus(String),

    /// Rejected locally before any network call (link modality on a
    /// Safari-family browser).
    #[error("{0}")]
    UnsupportedBrowser(String),

    /// The payment gateway answered with an error payload.
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    /// The payment gateway could not be reached or returned a malformed
    /// response.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    /// Any 502 from the backend. Fatal for the session.
    #[error("Backend infrastructure failure")]
    InfrastructureFailure,

    /// The gateway accepted a charge but the backend write that should
    /// have recorded it failed. Never retried against the gateway; the
    /// charge is parked in the outbox for recovery.
    #[error("Payment accepted by gateway but not recorded: {0}")]
    OrphanedCharge(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single human-readable shape callers surface in notifications.
    ///
    /// Prefers the server- or gateway-provided description when one was
    /// captured; internal errors collapse to a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Self::SerializationError(_) | Self::InternalError(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            Self::Other(_) => GENERIC_FAILURE_MESSAGE.to_string(),
            Self::InfrastructureFailure => GENERIC_FAILURE_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }

    /// True for the variants that end the session.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthError(_) | Self::SessionExpired | Self::Unauthorized(_)
        )
    }
}
