use actix_web::{http::header, http::StatusCode, test};
use gm_common::Points;
use gophermart_engine::{db_types::User, traits::StorageError};
use serde_json::json;
use uuid::Uuid;

use super::{
    helpers::{call, stored_user},
    mocks::MockAccounts,
};

#[actix_web::test]
async fn register_issues_a_token() {
    let mut db = MockAccounts::new();
    db.expect_create_user().returning(|login, hash| {
        Ok(User { id: Uuid::new_v4(), login: login.to_string(), pass: hash.to_string(), balance: Points::from(0.0) })
    });
    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"login": "user1", "password": "hunter2hunter2"}));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(header::AUTHORIZATION));
    assert!(resp.headers().contains_key(header::SET_COOKIE));
}

#[actix_web::test]
async fn register_rejects_a_taken_login() {
    let mut db = MockAccounts::new();
    db.expect_create_user().returning(|_, _| Err(StorageError::UserAlreadyExists));
    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"login": "user1", "password": "hunter2hunter2"}));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn register_rejects_empty_credentials() {
    let mut db = MockAccounts::new();
    db.expect_create_user().never();
    let req =
        test::TestRequest::post().uri("/api/user/register").set_json(json!({"login": "", "password": ""}));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn login_succeeds_with_the_right_password() {
    let mut db = MockAccounts::new();
    db.expect_fetch_user_by_login()
        .returning(|login| Ok(Some(stored_user(Uuid::new_v4(), login, "hunter2hunter2", 0.0))));
    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"login": "user1", "password": "hunter2hunter2"}));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(header::AUTHORIZATION));
}

#[actix_web::test]
async fn login_rejects_a_wrong_password() {
    let mut db = MockAccounts::new();
    db.expect_fetch_user_by_login()
        .returning(|login| Ok(Some(stored_user(Uuid::new_v4(), login, "the-real-password", 0.0))));
    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"login": "user1", "password": "a-guess"}));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn login_rejects_an_unknown_user() {
    let mut db = MockAccounts::new();
    db.expect_fetch_user_by_login().returning(|_| Ok(None));
    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"login": "nobody", "password": "whatever"}));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
