//! Registration, login, logout and profile management.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn register_then_login_with_username_or_email() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "quinn",
                "email": "Quinn@Example.com",
                "password": "s3cure-passphrase",
                "first_name": "Quinn"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["user"]["email"], "quinn@example.com");
    assert_eq!(body["data"]["user"]["is_staff"], false);
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert_eq!(body["data"]["token"]["token_type"], "Bearer");

    for login in ["quinn", "QUINN@example.com"] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/auth/login",
                Some(json!({ "login": login, "password": "s3cure-passphrase" })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login as {login}");
    }

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "login": "quinn", "password": "wrong-passphrase" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_accounts_are_rejected() {
    let app = TestApp::new().await;
    app.customer("rachel").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "someone-else",
                "email": "RACHEL@example.com",
                "password": "another-passphrase"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "sam",
                "email": "sam@example.com",
                "password": "short"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = TestApp::new().await;
    let customer = app.customer("tina").await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&customer.token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::POST, "/api/v1/auth/logout", None, Some(&customer.token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&customer.token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_updates_are_persisted() {
    let app = TestApp::new().await;
    let customer = app.customer("uma").await;

    let response = app
        .request(
            Method::PUT,
            "/api/v1/profile",
            Some(json!({
                "first_name": "Uma",
                "phone_number": "+34600111222",
                "date_of_birth": "1990-04-12",
                "emergency_contact": "Victor"
            })),
            Some(&customer.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/profile", None, Some(&customer.token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["user"]["first_name"], "Uma");
    assert_eq!(body["data"]["profile"]["phone_number"], "+34600111222");
    assert_eq!(body["data"]["profile"]["date_of_birth"], "1990-04-12");
    assert_eq!(body["data"]["profile"]["emergency_contact"], "Victor");

    // Phone numbers are bounded
    let response = app
        .request(
            Method::PUT,
            "/api/v1/profile",
            Some(json!({ "phone_number": "0".repeat(16) })),
            Some(&customer.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_email_must_stay_unique() {
    let app = TestApp::new().await;
    let first = app.customer("walt").await;
    app.customer("xena").await;

    let response = app
        .request(
            Method::PUT,
            "/api/v1/profile",
            Some(json!({ "email": "xena@example.com" })),
            Some(&first.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let user = app.user(first.id).await;
    assert_eq!(user.email, "walt@example.com");
}

#[tokio::test]
async fn status_and_health_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["service"], "pharmacy-online");

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["checks"]["database"], "healthy");
    assert!(body["meta"]["request_id"].is_string());
}
