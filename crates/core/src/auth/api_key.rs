//! API Key authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};
use crate::config::ApiToken;

/// Authenticator that maps configured bearer tokens to fixed identities.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
pub struct ApiKeyAuthenticator {
    tokens: Vec<ApiToken>,
}

impl ApiKeyAuthenticator {
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self { tokens }
    }

    /// Extract API key from request headers.
    fn extract_key(&self, request: &AuthRequest) -> Option<String> {
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(key) = auth_header.strip_prefix("Bearer ") {
                return Some(key.to_string());
            }
            if let Some(key) = auth_header.strip_prefix("bearer ") {
                return Some(key.to_string());
            }
        }

        if let Some(key) = request.headers.get("x-api-key") {
            return Some(key.clone());
        }

        None
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Every entry is compared so the time taken does not depend on the match position.
        let mut matched: Option<&ApiToken> = None;
        for entry in &self.tokens {
            if constant_time_eq(provided_key.as_bytes(), entry.token.as_bytes()) {
                matched = Some(entry);
            }
        }

        match matched {
            Some(entry) => Ok(Identity {
                user_id: entry.user_id.clone(),
                role: entry.role,
                method: "api_key".to_string(),
            }),
            None => Err(AuthError::InvalidCredentials("Invalid API key".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
