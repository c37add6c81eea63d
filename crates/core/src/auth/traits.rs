//! The authentication seam between transports and the triage services.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

/// Why a caller could not be identified.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials at all. The HTTP layer answers 401.
    #[error("Authentication required")]
    NotAuthenticated,

    /// Credentials were present but unknown or malformed, e.g. an
    /// unrecognised API key or an unknown role header.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The `[auth]` section cannot produce a working authenticator.
    #[error("Invalid auth configuration: {0}")]
    InvalidConfig(String),
}

/// Resolves a request's headers to an [`Identity`]: a user id plus the
/// agent or customer role that decides what the caller may see and do.
///
/// Verification only: issuing credentials happens elsewhere. Called once per
/// HTTP request and once per live-update connection, before the upgrade.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Config name of the method (`none`, `api_key`), for logs and metrics.
    fn method_name(&self) -> &'static str;
}
