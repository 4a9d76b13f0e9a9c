//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::AccountId;

use crate::error::ApiError;

/// Header naming the acting account.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// The account performing the request, taken from the `x-account-id` header.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub AccountId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACCOUNT_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {ACCOUNT_HEADER} header")))?;
        let raw = value
            .to_str()
            .map_err(|_| ApiError::Unauthenticated(format!("{ACCOUNT_HEADER} is not text")))?;
        let id = raw
            .trim()
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("{ACCOUNT_HEADER} is not an account id")))?;
        Ok(Actor(id))
    }
}
