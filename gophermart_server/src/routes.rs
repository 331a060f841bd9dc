//! Request handler definitions
//!
//! Handlers are generic over the storage backend so the endpoint tests can substitute mocks;
//! actix cannot register generic handlers through the attribute macros, so everything is wired
//! up explicitly in [`configure`].
use actix_web::{
    cookie::Cookie,
    http::header,
    web::{self, ServiceConfig},
    HttpRequest, HttpResponse,
};
use gophermart_engine::{
    db_types::NewOrderResult,
    traits::{AccountManagement, StorageError},
    OrderFlowApi, OrderFlowError,
};
use log::*;

use crate::{
    auth::{AuthenticatedUser, TokenIssuer},
    data_objects::{Credentials, OrderResponse, WithdrawRequest, WithdrawalResponse},
    errors::ServerError,
};

pub fn configure<B: AccountManagement + 'static>(cfg: &mut ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/api/user")
            .route("/register", web::post().to(register::<B>))
            .route("/login", web::post().to(login::<B>))
            .service(
                web::resource("/orders")
                    .route(web::post().to(submit_order::<B>))
                    .route(web::get().to(list_orders::<B>)),
            )
            .route("/balance", web::get().to(balance::<B>))
            .route("/balance/withdraw", web::post().to(withdraw::<B>))
            .route("/withdrawals", web::get().to(list_withdrawals::<B>)),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("👍️")
}

/// Issue the token both ways: `Authorization` header for API clients, cookie for browsers.
fn authorized_response(issuer: &TokenIssuer, user_id: uuid::Uuid) -> Result<HttpResponse, ServerError> {
    let token = issuer.issue_token(user_id).map_err(|e| ServerError::Unspecified(e.to_string()))?;
    let cookie = Cookie::build(issuer.cookie_name().to_string(), token.clone()).path("/").finish();
    Ok(HttpResponse::Ok().insert_header((header::AUTHORIZATION, token)).cookie(cookie).finish())
}

async fn register<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    issuer: web::Data<TokenIssuer>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse, ServerError> {
    let Credentials { login, password } = body.into_inner();
    if login.trim().is_empty() || password.is_empty() {
        return Err(ServerError::InvalidRequestBody("login and password must be non-empty".to_string()));
    }
    let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        .map_err(|e| ServerError::Unspecified(e.to_string()))?;
    match api.db().create_user(&login, &hash).await {
        Ok(user) => {
            info!("🙋️ New user registered: {login}");
            authorized_response(&issuer, user.id)
        },
        Err(StorageError::UserAlreadyExists) => Ok(HttpResponse::Conflict().finish()),
        Err(e) => {
            error!("🙋️ Could not register user {login}: {e}");
            Ok(HttpResponse::InternalServerError().finish())
        },
    }
}

async fn login<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    issuer: web::Data<TokenIssuer>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse, ServerError> {
    let Credentials { login, password } = body.into_inner();
    let user = match api.db().fetch_user_by_login(&login).await {
        Ok(user) => user,
        Err(e) => {
            error!("🙋️ Login lookup for {login} failed: {e}");
            return Ok(HttpResponse::InternalServerError().finish());
        },
    };
    match user {
        Some(user) if bcrypt::verify(&password, &user.pass).unwrap_or(false) => {
            debug!("🙋️ User {login} logged in");
            authorized_response(&issuer, user.id)
        },
        _ => {
            debug!("🙋️ Rejected login for {login}");
            Ok(HttpResponse::Unauthorized().finish())
        },
    }
}

async fn submit_order<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    user: AuthenticatedUser,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError> {
    let content_type = req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("");
    if !content_type.starts_with("text/plain") {
        return Ok(HttpResponse::BadRequest().finish());
    }
    let number = String::from_utf8(body.to_vec())
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let response = match api.submit_order(user.0, number.trim()).await {
        Ok(NewOrderResult::Accepted) => HttpResponse::Accepted().finish(),
        Ok(NewOrderResult::AlreadyYours) => HttpResponse::Ok().finish(),
        Ok(NewOrderResult::OwnedByOther) => HttpResponse::Conflict().finish(),
        Err(OrderFlowError::InvalidOrderNumber) => HttpResponse::UnprocessableEntity().finish(),
        Err(e) => {
            error!("🧾️ Order submission failed: {e}");
            HttpResponse::InternalServerError().finish()
        },
    };
    Ok(response)
}

async fn list_orders<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ServerError> {
    match api.orders(user.0).await {
        Ok(orders) if orders.is_empty() => Ok(HttpResponse::NoContent().finish()),
        Ok(orders) => {
            let body: Vec<OrderResponse> = orders.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(body))
        },
        Err(e) => {
            error!("🧾️ Listing orders failed: {e}");
            Ok(HttpResponse::InternalServerError().finish())
        },
    }
}

async fn balance<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ServerError> {
    match api.balance(user.0).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(summary)),
        Err(e) => {
            error!("💰️ Balance lookup failed: {e}");
            Ok(HttpResponse::InternalServerError().finish())
        },
    }
}

async fn withdraw<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    user: AuthenticatedUser,
    body: web::Json<WithdrawRequest>,
) -> Result<HttpResponse, ServerError> {
    let WithdrawRequest { order, sum } = body.into_inner();
    let response = match api.withdraw(user.0, &order, sum.into()).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(OrderFlowError::NotEnoughBalance) => HttpResponse::PaymentRequired().finish(),
        Err(
            OrderFlowError::InvalidOrderNumber | OrderFlowError::AlreadyWithdrawn | OrderFlowError::InvalidSum,
        ) => HttpResponse::UnprocessableEntity().finish(),
        Err(e) => {
            error!("💰️ Withdrawal failed: {e}");
            HttpResponse::InternalServerError().finish()
        },
    };
    Ok(response)
}

async fn list_withdrawals<B: AccountManagement>(
    api: web::Data<OrderFlowApi<B>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ServerError> {
    match api.withdrawals(user.0).await {
        Ok(withdrawals) if withdrawals.is_empty() => Ok(HttpResponse::NoContent().finish()),
        Ok(withdrawals) => {
            let body: Vec<WithdrawalResponse> = withdrawals.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(body))
        },
        Err(e) => {
            error!("💰️ Listing withdrawals failed: {e}");
            Ok(HttpResponse::InternalServerError().finish())
        },
    }
}
