use std::sync::Arc;

use actix_web::{dev::ServiceResponse, test, web, App};
use gm_common::{Points, Secret};
use gophermart_engine::{db_types::User, OrderFlowApi};
use uuid::Uuid;

use super::mocks::MockAccounts;
use crate::{auth::TokenIssuer, config::AuthConfig, routes};

// base64 of a throwaway signing secret
const TEST_SECRET_B64: &str = "c2VjcmV0";

pub(crate) fn test_issuer() -> TokenIssuer {
    let config =
        AuthConfig { cookie_name: "auth".to_string(), secret: Secret::new(TEST_SECRET_B64.to_string()) };
    TokenIssuer::new(&config).expect("test issuer must build")
}

pub(crate) fn issue_token(user_id: Uuid) -> String {
    test_issuer().issue_token(user_id).expect("token must issue")
}

/// A user row as the store would hand it back. `password` is hashed with a low cost factor to
/// keep the tests fast.
pub(crate) fn stored_user(id: Uuid, login: &str, password: &str, balance: f64) -> User {
    User {
        id,
        login: login.to_string(),
        pass: bcrypt::hash(password, 4).expect("hashing must work"),
        balance: Points::from(balance),
    }
}

/// Build the full route tree around the mocked store and dispatch one request against it.
pub(crate) async fn call(db: MockAccounts, req: test::TestRequest) -> ServiceResponse {
    let _ = env_logger::try_init();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(OrderFlowApi::new(Arc::new(db))))
            .app_data(web::Data::new(test_issuer()))
            .configure(routes::configure::<MockAccounts>),
    )
    .await;
    test::call_service(&app, req.to_request()).await
}
