//! `/api/accounts` handlers.
//!
//! Access tokens travel in the JSON body of login and refresh responses and
//! come back as `Authorization: Bearer`. Refresh tokens only ever travel in an
//! HTTP-only cookie.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use std::sync::Arc;

use super::auth::CurrentAccount;
use super::client_ip::ClientIp;
use super::{
    ApiError, ApiResponse, AppState, AuthenticateRequest, ForgotPasswordRequest, MessageResponse,
    SessionResponse, TokenRequest,
};
use crate::constants::tokens::{REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH};
use crate::db::RefreshToken;
use crate::domain::AccountId;
use crate::services::{
    AccountError, AccountView, AuthenticatedSession, CreateAccountRequest, RefreshTokenView,
    RegisterRequest, ResetPasswordRequest, UpdateAccountRequest,
};

type SessionReply = (CookieJar, Json<ApiResponse<SessionResponse>>);

fn refresh_cookie(token: &RefreshToken, secure: bool) -> Cookie<'static> {
    let remaining = (token.expires - Utc::now()).num_seconds().max(0);
    Cookie::build((REFRESH_COOKIE_NAME, token.token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path(REFRESH_COOKIE_PATH)
        .secure(secure)
        .max_age(time::Duration::seconds(remaining))
        .build()
}

fn session_reply(state: &AppState, jar: CookieJar, session: AuthenticatedSession) -> SessionReply {
    let cookie = refresh_cookie(&session.refresh_token, state.shared.config.server.secure_cookies);
    (
        jar.add(cookie),
        Json(ApiResponse::success(SessionResponse::from(session))),
    )
}

fn message(text: &str) -> Json<ApiResponse<MessageResponse>> {
    Json(ApiResponse::success(MessageResponse::new(text)))
}

/// POST /api/accounts/authenticate
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    Json(payload): Json<AuthenticateRequest>,
) -> Result<SessionReply, ApiError> {
    let session = state
        .account_service()
        .authenticate(&payload.email, &payload.password, &ip)
        .await?;

    Ok(session_reply(&state, jar, session))
}

/// POST /api/accounts/refresh-token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
) -> Result<SessionReply, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or(AccountError::InvalidToken)?;

    let session = state.account_service().refresh(&token, &ip).await?;

    Ok(session_reply(&state, jar, session))
}

/// POST /api/accounts/revoke-token
///
/// Revokes the token in the body, or the cookie's token when the body has none.
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    payload: Option<Json<TokenRequest>>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let token = payload
        .and_then(|Json(body)| body.token)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE_NAME).map(|c| c.value().to_string()))
        .ok_or_else(|| ApiError::validation("token", "Token is required"))?;

    state
        .account_service()
        .revoke_as(&current.actor(), &token, &ip)
        .await?;

    Ok(message("Token revoked"))
}

/// POST /api/accounts/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.account_service().register(payload).await?;
    Ok(message(
        "Registration successful, please check your email for verification instructions",
    ))
}

/// POST /api/accounts/verify-email
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let token = payload.token.unwrap_or_default();
    state.account_service().verify_email(&token).await?;
    Ok(message("Verification successful, you can now login"))
}

/// POST /api/accounts/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .account_service()
        .request_password_reset(&payload.email)
        .await?;
    Ok(message(
        "Please check your email for password reset instructions",
    ))
}

/// POST /api/accounts/validate-reset-token
pub async fn validate_reset_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let token = payload.token.unwrap_or_default();
    state.account_service().validate_reset_token(&token).await?;
    Ok(message("Token is valid"))
}

/// POST /api/accounts/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.account_service().reset_password(payload).await?;
    Ok(message("Password reset successful, you can now login"))
}

/// GET /api/accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<Vec<AccountView>>>, ApiError> {
    let accounts = state
        .account_service()
        .list_accounts(&current.actor())
        .await?;
    Ok(Json(ApiResponse::success(accounts)))
}

/// POST /api/accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<Json<ApiResponse<AccountView>>, ApiError> {
    let account = state
        .account_service()
        .create_account(&current.actor(), payload)
        .await?;
    Ok(Json(ApiResponse::success(account)))
}

/// GET /api/accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AccountView>>, ApiError> {
    let account = state
        .account_service()
        .get_account(&current.actor(), AccountId::new(id))
        .await?;
    Ok(Json(ApiResponse::success(account)))
}

/// PUT /api/accounts/{id}
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<AccountView>>, ApiError> {
    let account = state
        .account_service()
        .update_account(&current.actor(), AccountId::new(id), payload)
        .await?;
    Ok(Json(ApiResponse::success(account)))
}

/// DELETE /api/accounts/{id}
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .account_service()
        .delete_account(&current.actor(), AccountId::new(id))
        .await?;
    Ok(message("Account deleted successfully"))
}

/// GET /api/accounts/{id}/refresh-tokens
pub async fn list_refresh_tokens(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<RefreshTokenView>>>, ApiError> {
    let tokens = state
        .account_service()
        .list_refresh_tokens(&current.actor(), AccountId::new(id))
        .await?;
    Ok(Json(ApiResponse::success(tokens)))
}
