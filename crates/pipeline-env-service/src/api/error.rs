use actix_web::{body::BoxBody, http::StatusCode, HttpResponse, ResponseError};
use pipeline_env_types::error::{error_response, DetailedError};
use serde::Serialize;
use std::{borrow::Cow, error::Error as StdError, fmt, fmt::Display};

/// Errors in requests as received by the REST API.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiError {
    InvalidUuidParam { value: String, error: String },
    InvalidPayload { reason: String },
    Unauthorized { reason: String },
}

impl DetailedError for ApiError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::InvalidUuidParam { .. } | Self::InvalidPayload { .. } => {
                Cow::from("bad_parameter")
            }
            Self::Unauthorized { .. } => Cow::from("jwt_security_error"),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUuidParam { value, error } => {
                write!(f, "Invalid UUID string '{value}': '{error}'")
            }
            Self::InvalidPayload { reason } => {
                write!(f, "Invalid request payload: {reason}")
            }
            Self::Unauthorized { reason } => write!(f, "Unauthorized: {reason}"),
        }
    }
}

impl StdError for ApiError {}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        error_response(self)
    }
}
