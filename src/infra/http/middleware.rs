use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::{Request, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::error::ApiError;
use super::state::ApiState;

/// Bearer service-token check for every API route. When no token is
/// configured the check is skipped, which is only acceptable for local
/// development setups.
pub async fn service_auth(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.service_token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "));

    match presented {
        Some(token) if token.as_bytes().ct_eq(expected.as_bytes()).into() => {
            next.run(request).await
        }
        _ => ApiError::unauthorized().into_response(),
    }
}

/// Account scope for a request, taken from the `x-account-id` header the
/// frontend proxy injects after its own session check.
#[derive(Debug, Clone, Copy)]
pub struct AccountId(pub Uuid);

impl<S> FromRequestParts<S> for AccountId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-account-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("missing x-account-id header"))?;

        let id = Uuid::parse_str(raw)
            .map_err(|_| ApiError::bad_request("x-account-id must be a UUID"))?;
        Ok(AccountId(id))
    }
}
