use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde_json::json;
use thiserror::Error;

use crate::patch::PatchError;
use crate::store::StoreError;

/// Every failure a route can return. Rendered as
/// `{"success": false, "error": <message>, "code": <CODE>}` with the matching status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    RateLimit(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

pub type ApiResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Authorization(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// `not_found("Post")` -> "Post not found"
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> Status {
        match self {
            AppError::Validation(_) => Status::BadRequest,
            AppError::Authentication(_) => Status::Unauthorized,
            AppError::Authorization(_) => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Conflict(_) => Status::Conflict,
            AppError::RateLimit(_) => Status::TooManyRequests,
            AppError::Storage(_) => Status::InternalServerError,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Authentication(_) => "AUTHENTICATION_REQUIRED",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::RateLimit(_) => "RATE_LIMITED",
            AppError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Storage details stay in the server log.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unique(field) => AppError::Conflict(format!("{} is already taken", field)),
            StoreError::Constraint(msg) => AppError::Validation(msg),
            StoreError::NotFound => AppError::NotFound("Record not found".to_string()),
            StoreError::Backend(msg) => AppError::Storage(msg),
        }
    }
}

impl From<PatchError> for AppError {
    fn from(e: PatchError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        if let AppError::Storage(ref detail) = self {
            log::error!("{} {}: {}", req.method(), req.uri(), detail);
        }
        let body = json!({
            "success": false,
            "error": self.client_message(),
            "code": self.code(),
        });
        (self.status(), Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_unique_maps_to_conflict() {
        let e: AppError = StoreError::Unique("slug".to_string()).into();
        assert_eq!(e.status(), Status::Conflict);
        assert_eq!(e.client_message(), "slug is already taken");
    }

    #[test]
    fn storage_detail_is_hidden_from_clients() {
        let e: AppError = StoreError::Backend("disk I/O error".to_string()).into();
        assert_eq!(e.status(), Status::InternalServerError);
        assert_eq!(e.client_message(), "Internal server error");
        assert_eq!(e.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn empty_patch_is_a_validation_error() {
        let e: AppError = PatchError::Empty.into();
        assert_eq!(e.status(), Status::BadRequest);
    }
}
