//! [`ServiceError`] is the top-level error type returned by HTTP endpoints.
//!
//! ```text
//! ServiceError (this module)
//! ├─ api::error::ApiError (malformed or unauthenticated requests)
//! ├─ db::error::DBError (errors returned by the `db` module)
//! ├─ space::SpaceError (errors of the space lookup)
//! ```
//!
//! Every error renders as a JSON-API error document (see
//! [`pipeline_env_types::error::ErrorResponse`]).
use crate::api::error::ApiError;
use crate::db::error::DBError;
use crate::space::SpaceError;
use actix_web::{body::BoxBody, http::StatusCode, HttpResponse, ResponseError};
use pipeline_env_types::error::{error_response, DetailedError};
use serde::Serialize;
use std::{
    borrow::Cow,
    error::Error as StdError,
    fmt::{Display, Error as FmtError, Formatter},
};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServiceError {
    ApiError {
        #[serde(flatten)]
        api_error: ApiError,
    },
    DBError {
        #[serde(flatten)]
        db_error: DBError,
    },
    SpaceError {
        #[serde(flatten)]
        space_error: SpaceError,
    },
}

impl StdError for ServiceError {}

impl From<ApiError> for ServiceError {
    fn from(api_error: ApiError) -> Self {
        Self::ApiError { api_error }
    }
}

impl From<DBError> for ServiceError {
    fn from(db_error: DBError) -> Self {
        Self::DBError { db_error }
    }
}

impl From<SpaceError> for ServiceError {
    fn from(space_error: SpaceError) -> Self {
        Self::SpaceError { space_error }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::ApiError { api_error } => api_error.fmt(f),
            Self::DBError { db_error } => db_error.fmt(f),
            Self::SpaceError { space_error } => space_error.fmt(f),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ApiError { api_error } => api_error.status_code(),
            Self::DBError { db_error } => db_error.status_code(),
            Self::SpaceError { space_error } => space_error.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        error_response(self)
    }
}

impl DetailedError for ServiceError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::ApiError { api_error } => api_error.error_code(),
            Self::DBError { db_error } => db_error.error_code(),
            Self::SpaceError { space_error } => space_error.error_code(),
        }
    }
}
