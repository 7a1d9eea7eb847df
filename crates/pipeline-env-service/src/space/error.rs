use crate::db::types::pipeline_environment::SpaceId;
use actix_web::{body::BoxBody, http::StatusCode, HttpResponse, ResponseError};
use pipeline_env_types::error::{error_response, DetailedError};
use serde::Serialize;
use std::{borrow::Cow, error::Error as StdError, fmt, fmt::Display};

/// Errors of looking up a space in the space lookup service.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SpaceError {
    /// The service does not know the space.
    NotFound { space_id: SpaceId },
    /// The service responded with an unexpected status, or could not be
    /// reached or understood at all (`status` is then absent).
    UnknownError {
        space_id: SpaceId,
        status: Option<u16>,
        reason: String,
    },
}

impl DetailedError for SpaceError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::NotFound { .. } => Cow::from("not_found"),
            Self::UnknownError { .. } => Cow::from("unknown_error"),
        }
    }
}

impl Display for SpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { space_id } => {
                write!(f, "Space with id '{space_id}' not found")
            }
            Self::UnknownError {
                space_id,
                status: Some(status),
                reason,
            } => {
                write!(
                    f,
                    "Unexpected response status {status} when looking up space '{space_id}': {reason}"
                )
            }
            Self::UnknownError {
                space_id,
                status: None,
                reason,
            } => {
                write!(f, "Unable to look up space '{space_id}': {reason}")
            }
        }
    }
}

impl StdError for SpaceError {}

impl ResponseError for SpaceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnknownError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        error_response(self)
    }
}
