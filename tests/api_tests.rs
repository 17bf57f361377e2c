mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::{Duration, Utc};
use common::{PASSWORD, TestContext};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn spawn_app() -> (Router, TestContext) {
    let ctx = TestContext::new().await;
    let state = staffgate::api::create_app_state(ctx.state.clone(), None);
    (staffgate::api::router(state), ctx)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// `refreshToken=<value>` from the response's Set-Cookie header.
fn refresh_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("missing Set-Cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/api/accounts"));
    set_cookie.split(';').next().unwrap().to_string()
}

async fn login(app: &Router, email: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/accounts/authenticate",
            &json!({ "email": email, "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = refresh_cookie(&response);
    let body = body_json(response).await;
    let jwt = body["data"]["jwtToken"].as_str().unwrap().to_string();
    (jwt, cookie)
}

#[tokio::test]
async fn test_register_verify_authenticate() {
    let (app, ctx) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/accounts/register",
            &json!({
                "title": "Ms",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
                "acceptTerms": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/accounts/authenticate",
            &json!({ "email": "ada@example.com", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "NOT_VERIFIED");

    let token =
        common::extract_token(&ctx.last_email_to("ada@example.com").await.html_body);
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/accounts/verify-email",
            &json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/accounts/authenticate",
            &json!({ "email": "ada@example.com", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert_eq!(body["data"]["role"], "Admin");
    assert_eq!(body["data"]["isVerified"], true);
    assert!(body["data"]["jwtToken"].is_string());
    assert!(body["data"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_validation_names_field() {
    let (app, _ctx) = spawn_app().await;

    let response = app
        .oneshot(post_json(
            "/api/accounts/register",
            &json!({
                "title": "Mr",
                "firstName": "Short",
                "lastName": "Password",
                "email": "short@example.com",
                "password": "abc",
                "confirmPassword": "abc",
                "acceptTerms": true
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field"], "password");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let (app, ctx) = spawn_app().await;
    ctx.register_verified("grace@example.com").await;

    let response = app
        .oneshot(post_json(
            "/api/accounts/authenticate",
            &json!({ "email": "grace@example.com", "password": "nope-nope" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_refresh_token_cookie_rotation() {
    let (app, ctx) = spawn_app().await;
    ctx.register_verified("linus@example.com").await;
    let (_, cookie) = login(&app, "linus@example.com").await;

    let refresh = |cookie: String| {
        Request::builder()
            .method("POST")
            .uri("/api/accounts/refresh-token")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(refresh(cookie.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = refresh_cookie(&response);
    assert_ne!(rotated, cookie);
    assert!(body_json(response).await["data"]["jwtToken"].is_string());

    let response = app.clone().oneshot(refresh(cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/accounts/refresh-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_bearer() {
    let (app, ctx) = spawn_app().await;
    ctx.register_verified("admin@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/accounts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");

    let (jwt, _) = login(&app, "admin@example.com").await;
    let response = app
        .clone()
        .oneshot(get_with_bearer("/api/accounts", &jwt))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_expired_access_token_has_distinct_code() {
    let (app, ctx) = spawn_app().await;
    ctx.register_verified("old@example.com").await;
    let session = ctx
        .state
        .account_service
        .authenticate("old@example.com", PASSWORD, "127.0.0.1")
        .await
        .unwrap();

    let stale = ctx
        .state
        .codec
        .issue_at(session.account.id, Utc::now() - Duration::hours(1))
        .unwrap();

    let response = app
        .clone()
        .oneshot(get_with_bearer(
            &format!("/api/accounts/{}", session.account.id),
            &stale.token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "TOKEN_EXPIRED");

    let response = app
        .oneshot(get_with_bearer(
            &format!("/api/accounts/{}", session.account.id),
            "not.a.jwt",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_user_cannot_read_other_accounts() {
    let (app, ctx) = spawn_app().await;
    ctx.register_verified("owner@example.com").await;
    ctx.register_verified("member@example.com").await;

    let (jwt, _) = login(&app, "member@example.com").await;

    let response = app
        .clone()
        .oneshot(get_with_bearer("/api/accounts/1", &jwt))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");

    let response = app
        .oneshot(get_with_bearer("/api/accounts/2", &jwt))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["email"], "member@example.com");
}

#[tokio::test]
async fn test_revoke_token_from_cookie() {
    let (app, ctx) = spawn_app().await;
    ctx.register_verified("leaving@example.com").await;
    let (jwt, cookie) = login(&app, "leaving@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/accounts/revoke-token")
                .header(header::AUTHORIZATION, format!("Bearer {jwt}"))
                .header(header::COOKIE, cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/accounts/refresh-token")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forgot_password_always_succeeds() {
    let (app, _ctx) = spawn_app().await;

    let response = app
        .oneshot(post_json(
            "/api/accounts/forgot-password",
            &json!({ "email": "nobody@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _ctx) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ready"], true);
    assert_eq!(body["checks"]["database"], true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_api_route_is_not_found() {
    let (app, _ctx) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["error"], "No route for /api/does-not-exist");
}
