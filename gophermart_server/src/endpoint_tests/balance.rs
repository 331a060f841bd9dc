use actix_web::{http::header, http::StatusCode, test};
use chrono::{TimeZone, Utc};
use gm_common::Points;
use gophermart_engine::{
    db_types::{BalanceSummary, OrderNumber, WithdrawalRecord},
    traits::StorageError,
};
use serde_json::json;
use uuid::Uuid;

use super::{
    helpers::{call, issue_token},
    mocks::MockAccounts,
};

fn get(path: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(path)
        .insert_header((header::AUTHORIZATION, issue_token(Uuid::new_v4())))
}

fn withdraw_request(body: serde_json::Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/user/balance/withdraw")
        .insert_header((header::AUTHORIZATION, issue_token(Uuid::new_v4())))
        .set_json(body)
}

#[actix_web::test]
async fn balance_reports_current_and_withdrawn() {
    let mut db = MockAccounts::new();
    db.expect_balance_for_user().returning(|_| {
        Ok(BalanceSummary { current: Points::from(50.3), withdrawn: Points::from(50.2) })
    });
    let resp = call(db, get("/api/user/balance")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"current": 50.3, "withdrawn": 50.2}));
}

#[actix_web::test]
async fn a_covered_withdrawal_succeeds() {
    let mut db = MockAccounts::new();
    db.expect_withdraw().returning(|_, _, _| Ok(()));
    let resp = call(db, withdraw_request(json!({"order": "3376308833", "sum": 50.2}))).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn an_uncovered_withdrawal_requires_payment() {
    let mut db = MockAccounts::new();
    db.expect_withdraw().returning(|_, _, _| Err(StorageError::NotEnoughBalance));
    let resp = call(db, withdraw_request(json!({"order": "3376308833", "sum": 100.6}))).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
}

#[actix_web::test]
async fn withdrawing_against_a_spent_order_is_unprocessable() {
    let mut db = MockAccounts::new();
    db.expect_withdraw().returning(|_, _, _| Err(StorageError::AlreadyWithdrawn));
    let resp = call(db, withdraw_request(json!({"order": "3376308833", "sum": 10.0}))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn withdrawing_against_a_luhn_invalid_number_is_unprocessable() {
    let mut db = MockAccounts::new();
    db.expect_withdraw().never();
    let resp = call(db, withdraw_request(json!({"order": "1111111117", "sum": 10.0}))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn an_empty_withdrawal_list_is_no_content() {
    let mut db = MockAccounts::new();
    db.expect_withdrawals_for_user().returning(|_| Ok(Vec::new()));
    let resp = call(db, get("/api/user/withdrawals")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn withdrawals_come_back_as_json() {
    let mut db = MockAccounts::new();
    db.expect_withdrawals_for_user().returning(|_| {
        Ok(vec![WithdrawalRecord {
            order_number: OrderNumber::from("3376308833"),
            sum: Points::from(50.2),
            processed_at: Utc.with_ymd_and_hms(2024, 3, 3, 9, 30, 0).unwrap(),
        }])
    });
    let resp = call(db, get("/api/user/withdrawals")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body[0]["order"], "3376308833");
    assert_eq!(body[0]["sum"], 50.2);
}

#[actix_web::test]
async fn balance_requires_authentication() {
    let db = MockAccounts::new();
    let resp = call(db, test::TestRequest::get().uri("/api/user/balance")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
