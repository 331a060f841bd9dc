//! JWT issuance and verification.
//!
//! The access token is an HS256 JWT whose subject is the user id. Clients may present it either
//! in the `Authorization` header (with or without a `Bearer ` prefix) or in the configured
//! cookie; the header wins when both are present.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id.
    pub sub: Uuid,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    cookie_name: String,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let secret = config.secret.reveal();
        let encoding_key = EncodingKey::from_base64_secret(secret)
            .map_err(|e| AuthError::Initialization(format!("AUTH_SECRET_KEY is not valid base64: {e}")))?;
        let decoding_key = DecodingKey::from_base64_secret(secret)
            .map_err(|e| AuthError::Initialization(format!("AUTH_SECRET_KEY is not valid base64: {e}")))?;
        Ok(Self { encoding_key, decoding_key, cookie_name: config.cookie_name.clone() })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let claims =
            JwtClaims { sub: user_id, exp: (Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp() };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::ValidationError(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(data.claims)
    }
}

/// Extractor for the logged-in user. Handlers that take this reject unauthenticated requests
/// with 401 before any of their own code runs.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

fn token_from_request(req: &HttpRequest, cookie_name: &str) -> Option<String> {
    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_string())
        .filter(|v| !v.is_empty());
    header.or_else(|| req.cookie(cookie_name).map(|c| c.value().to_string()))
}

impl FromRequest for AuthenticatedUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<TokenIssuer>>() {
            None => Err(ServerError::Unspecified("Token issuer is not configured".to_string())),
            Some(issuer) => match token_from_request(req, issuer.cookie_name()) {
                None => Err(ServerError::Unauthorized),
                Some(token) => match issuer.verify(&token) {
                    Ok(claims) => Ok(AuthenticatedUser(claims.sub)),
                    Err(e) => {
                        debug!("🔑️ Rejecting token: {e}");
                        Err(ServerError::Unauthorized)
                    },
                },
            },
        };
        ready(result)
    }
}

#[cfg(test)]
mod test {
    use gm_common::Secret;

    use super::*;

    fn issuer() -> TokenIssuer {
        // base64 of a throwaway test secret
        let config = AuthConfig { cookie_name: "auth".to_string(), secret: Secret::new("c2VjcmV0".to_string()) };
        TokenIssuer::new(&config).unwrap()
    }

    #[test]
    fn tokens_round_trip() {
        let issuer = issuer();
        let user = Uuid::new_v4();
        let token = issuer.issue_token(user).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, user);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let issuer = issuer();
        let mut token = issuer.issue_token(Uuid::new_v4()).unwrap();
        token.replace_range(token.len() - 4.., "0000");
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn bad_secrets_fail_at_startup() {
        let config =
            AuthConfig { cookie_name: "auth".to_string(), secret: Secret::new("not base64!!".to_string()) };
        assert!(TokenIssuer::new(&config).is_err());
    }
}
