//! Request authentication
//!
//! Clients send their credentials on every call as `username` and
//! `password` headers.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::SharedState;
use crate::error::Error;
use crate::types::UserId;

pub const USERNAME_HEADER: &str = "username";
pub const PASSWORD_HEADER: &str = "password";

/// The authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        let (Some(username), Some(password)) = (header(USERNAME_HEADER), header(PASSWORD_HEADER))
        else {
            return Err(Error::Unauthorized);
        };

        let user = state
            .accounts
            .authenticate(&state.db, &username, &password)
            .await?;
        Ok(AuthUser(user))
    }
}
