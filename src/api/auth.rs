use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::services::{AccountError, AccountView, Actor};

/// The account behind the request's bearer token. Inserted by
/// [`auth_middleware`] for protected routes.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub AccountView);

impl CurrentAccount {
    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor::from(&self.0)
    }
}

/// Requires `Authorization: Bearer <access token>`.
///
/// An expired token yields `TOKEN_EXPIRED` so clients know to refresh; any
/// other failure is `INVALID_TOKEN`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or(AccountError::InvalidToken)?;

    let account = state
        .account_service()
        .verify_access_token(token)
        .await?;

    tracing::Span::current().record("account_id", account.id.value());
    request.extensions_mut().insert(CurrentAccount(account));

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
