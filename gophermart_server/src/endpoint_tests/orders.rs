use actix_web::{http::header, http::StatusCode, test};
use chrono::{TimeZone, Utc};
use gm_common::Points;
use gophermart_engine::db_types::{NewOrderResult, Order, OrderNumber, OrderStatus};
use uuid::Uuid;

use super::{
    helpers::{call, issue_token},
    mocks::MockAccounts,
};

fn submit(token: &str, content_type: &str, body: &'static str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header((header::AUTHORIZATION, token.to_string()))
        .insert_header((header::CONTENT_TYPE, content_type.to_string()))
        .set_payload(body)
}

#[actix_web::test]
async fn a_fresh_order_is_accepted() {
    let mut db = MockAccounts::new();
    db.expect_save_order_for_user().returning(|_, _| Ok(NewOrderResult::Accepted));
    let resp = call(db, submit(&issue_token(Uuid::new_v4()), "text/plain", "5857088487")).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[actix_web::test]
async fn resubmitting_your_own_order_is_ok() {
    let mut db = MockAccounts::new();
    db.expect_save_order_for_user().returning(|_, _| Ok(NewOrderResult::AlreadyYours));
    let resp = call(db, submit(&issue_token(Uuid::new_v4()), "text/plain", "5857088487")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn someone_elses_order_conflicts() {
    let mut db = MockAccounts::new();
    db.expect_save_order_for_user().returning(|_, _| Ok(NewOrderResult::OwnedByOther));
    let resp = call(db, submit(&issue_token(Uuid::new_v4()), "text/plain", "5857088487")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn luhn_invalid_numbers_are_unprocessable() {
    let mut db = MockAccounts::new();
    db.expect_save_order_for_user().never();
    let resp = call(db, submit(&issue_token(Uuid::new_v4()), "text/plain", "1111111117")).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn wrong_content_type_is_a_bad_request() {
    let mut db = MockAccounts::new();
    db.expect_save_order_for_user().never();
    let resp = call(db, submit(&issue_token(Uuid::new_v4()), "application/json", "5857088487")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn submitting_without_a_token_is_unauthorized() {
    let db = MockAccounts::new();
    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header((header::CONTENT_TYPE, "text/plain"))
        .set_payload("5857088487");
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn an_empty_order_list_is_no_content() {
    let mut db = MockAccounts::new();
    db.expect_orders_for_user().returning(|_| Ok(Vec::new()));
    let req = test::TestRequest::get()
        .uri("/api/user/orders")
        .insert_header((header::AUTHORIZATION, issue_token(Uuid::new_v4())));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn orders_come_back_as_json() {
    let mut db = MockAccounts::new();
    db.expect_orders_for_user().returning(|_| {
        Ok(vec![
            Order {
                number: OrderNumber::from("2503317444"),
                status: OrderStatus::Processed,
                accrual: Some(Points::from(200.7)),
                uploaded_at: Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap(),
            },
            Order {
                number: OrderNumber::from("5857088487"),
                status: OrderStatus::New,
                accrual: None,
                uploaded_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            },
        ])
    });
    let req = test::TestRequest::get()
        .uri("/api/user/orders")
        .insert_header((header::AUTHORIZATION, issue_token(Uuid::new_v4())));
    let resp = call(db, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body[0]["number"], "2503317444");
    assert_eq!(body[0]["status"], "PROCESSED");
    assert_eq!(body[0]["accrual"], 200.7);
    assert_eq!(body[1]["number"], "5857088487");
    assert_eq!(body[1]["status"], "NEW");
    assert!(body[1].get("accrual").is_none());
}
