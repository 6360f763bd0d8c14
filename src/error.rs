use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::repository::StoreError;

/// ApiError
///
/// The single error type surfaced by every handler. Carries the HTTP status and
/// the client-facing message; rendered as a JSON body of the form
/// `{"message": "..."}`, which is the shape the API contract uses for all
/// failure responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Rejection used by the authentication extractor and middleware.
    /// The exact body text is part of the API contract.
    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthenticated.")
    }

    /// Login failure. Deliberately identical for unknown email and wrong
    /// password so the endpoint cannot be used for account enumeration.
    pub fn invalid_credentials() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Invalid email or password")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    /// Generic 500. Internal details are logged where the failure happened,
    /// never echoed to the client.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Default storage-error mapping: uniqueness conflicts become 409, anything
/// else becomes an opaque 500. Handlers that need a specific conflict message
/// (e.g. duplicate enrollment) match on `StoreError::Conflict` themselves
/// before falling back to this conversion.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::conflict("Conflict"),
            StoreError::Database(e) => {
                tracing::error!("storage error: {:?}", e);
                Self::internal()
            }
        }
    }
}
