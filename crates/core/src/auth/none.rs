use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity, Role};

/// Header carrying the caller's user id in development mode.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role in development mode.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Authenticator that trusts identity headers.
/// Must be explicitly configured - the system won't default to this.
///
/// Without headers the caller is an anonymous customer.
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let mut identity = Identity::anonymous();

        if let Some(user_id) = request.headers.get(USER_ID_HEADER) {
            let user_id = user_id.trim();
            if !user_id.is_empty() {
                identity.user_id = user_id.to_string();
            }
        }

        if let Some(role) = request.headers.get(USER_ROLE_HEADER) {
            identity.role = role
                .parse::<Role>()
                .map_err(AuthError::InvalidCredentials)?;
        }

        Ok(identity)
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
