//! Response envelopes and API errors
//!
//! Every gateway reply is wrapped as `{success, data}`. The outer `success`
//! only says the gateway handled the request; device outcomes live in the
//! nested result.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

/// Standard `{success, data}` envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Gateway API errors, rendered as `{success: false, message}`
#[derive(Debug)]
pub enum ApiError {
    /// Unknown device id
    NotFound(String),
    /// Request failed validation
    BadRequest(String),
    /// Body could not be extracted; keeps the extractor's status
    Rejected(StatusCode, String),
    /// Device did not answer a synchronous query
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    /// Reject a request whose required string field is blank
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] naming `field` when `value` is blank
    pub fn require(field: &str, value: &str) -> Result<(), Self> {
        if value.trim().is_empty() {
            return Err(Self::BadRequest(format!("{field} must not be empty")));
        }
        Ok(())
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected(status, _) => *status,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::DeviceNotFound(_) => Self::NotFound(err.to_string()),
            Error::InvalidDevice(_) => Self::BadRequest(err.to_string()),
            Error::Connection(_) => Self::BadGateway(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            success: bool,
            message: String,
        }

        let status = self.status();
        let message = match self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Rejected(_, msg)
            | Self::BadGateway(msg)
            | Self::Internal(msg) => msg,
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, message = %message, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_crate_errors_to_status() {
        let cases = [
            (Error::DeviceNotFound("d9".into()), StatusCode::NOT_FOUND),
            (Error::InvalidDevice("bad".into()), StatusCode::BAD_REQUEST),
            (Error::Connection("down".into()), StatusCode::BAD_GATEWAY),
            (Error::Config("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn not_found_names_the_device() {
        let ApiError::NotFound(message) = ApiError::from(Error::DeviceNotFound("unknown".into()))
        else {
            panic!("expected not found");
        };
        assert!(message.contains("unknown"));
    }

    #[test]
    fn require_rejects_blank() {
        assert!(ApiError::require("contact", "Alice").is_ok());
        assert!(matches!(
            ApiError::require("contact", "  "),
            Err(ApiError::BadRequest(msg)) if msg.contains("contact")
        ));
    }
}
