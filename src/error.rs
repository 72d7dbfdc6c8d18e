use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::middleware::error_handling;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

impl AppError {
    /// HTTP status code for this error (400 validation, 401/403 auth,
    /// 404 missing, 500 unexpected).
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_api_contract() {
        assert_eq!(AppError::BadRequest("bad".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::Forbidden("no".into()).status_code(), 403);
        assert_eq!(AppError::NotFound("gone".into()).status_code(), 404);
        assert_eq!(AppError::Database("boom".into()).status_code(), 500);
        assert_eq!(AppError::Internal.status_code(), 500);
    }

    #[test]
    fn messages_pass_through_for_client_visible_errors() {
        let err = AppError::NotFound("Conversation not found".into());
        assert_eq!(err.to_string(), "Conversation not found");
    }
}
