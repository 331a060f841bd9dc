use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match *self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).insert_header(ContentType::plaintext()).body(self.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Could not set up token signing. {0}")]
    Initialization(String),
    #[error("The token is poorly formatted. {0}")]
    PoorlyFormattedToken(String),
    #[error("The token did not validate. {0}")]
    ValidationError(String),
}
