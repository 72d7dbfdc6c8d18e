use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

use crate::error::AppError;

/// Wire shape for every failed request: `{"success": false, "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

pub fn map_error(err: &AppError) -> (StatusCode, ErrorBody) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    // Internal details stay in the logs, not in the response body.
    let message = match err {
        AppError::Config(_) | AppError::StartServer(_) | AppError::Database(_) => {
            tracing::error!(error = %err, "request failed with server error");
            "Server error".to_string()
        }
        AppError::Internal => "Server error".to_string(),
        other => other.to_string(),
    };

    (
        status,
        ErrorBody {
            success: false,
            message,
        },
    )
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, body) = map_error(err);
    HttpResponse::build(status).json(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_database_error_to_opaque_500() {
        let (status, body) = map_error(&AppError::Database("connection refused".into()));
        assert_eq!(status.as_u16(), 500);
        assert!(!body.success);
        assert_eq!(body.message, "Server error");
    }

    #[test]
    fn maps_not_found_with_its_message() {
        let (status, body) = map_error(&AppError::NotFound("Group not found".into()));
        assert_eq!(status.as_u16(), 404);
        assert_eq!(body.message, "Group not found");
    }
}
