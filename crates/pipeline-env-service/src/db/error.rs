use crate::db::types::pipeline_environment::SpaceId;
use actix_web::{body::BoxBody, http::StatusCode, HttpResponse, ResponseError};
use deadpool_postgres::PoolError;
use openssl::error::ErrorStack;
use pipeline_env_types::error::{error_response, DetailedError};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use std::time::Duration;
use std::{backtrace::Backtrace, borrow::Cow, error::Error as StdError, fmt, fmt::Display};
use tokio_postgres::error::Error as PgError;

#[derive(Debug, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum DBError {
    #[serde(serialize_with = "serialize_pg_error")]
    PostgresError {
        error: Box<PgError>,
        backtrace: Backtrace,
    },
    #[serde(serialize_with = "serialize_pgpool_error")]
    PostgresPoolError {
        error: Box<PoolError>,
        backtrace: Backtrace,
    },
    PoolBuild {
        error: String,
    },
    #[serde(serialize_with = "serialize_tls_connection")]
    TlsConnection {
        hint: String,
        openssl_error: Option<ErrorStack>,
    },
    TransactionTimeout {
        #[serde(with = "duration_secs")]
        timeout: Duration,
    },
    // Catch-all error for unexpected invalid data extracted from the database.
    #[serde(serialize_with = "serialize_invalid_data")]
    InvalidData {
        error: String,
        backtrace: Backtrace,
    },
    #[serde(serialize_with = "serialize_unique_key_violation")]
    UniqueKeyViolation {
        constraint: &'static str,
        backtrace: Backtrace,
    },
    // When the (space, name) unique constraint is violated
    DuplicateName {
        space_id: SpaceId,
        name: String,
    },
    UnknownPipelineEnvironment {
        space_id: SpaceId,
    },
}

impl DBError {
    pub fn invalid_data(error: String) -> Self {
        Self::InvalidData {
            error,
            backtrace: Backtrace::capture(),
        }
    }
    pub fn unique_key_violation(constraint: &'static str) -> Self {
        Self::UniqueKeyViolation {
            constraint,
            backtrace: Backtrace::capture(),
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs_f64()))
    }
}

fn serialize_pg_error<S>(
    error: &PgError,
    backtrace: &Backtrace,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("PgError", 2)?;
    ser.serialize_field("error", &error.to_string())?;
    ser.serialize_field("backtrace", &backtrace.to_string())?;
    ser.end()
}

fn serialize_pgpool_error<S>(
    error: &PoolError,
    backtrace: &Backtrace,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("PgPoolError", 2)?;
    ser.serialize_field("error", &error.to_string())?;
    ser.serialize_field("backtrace", &backtrace.to_string())?;
    ser.end()
}

fn serialize_tls_connection<S>(
    hint: &String,
    openssl_error: &Option<ErrorStack>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("TlsConnection", 2)?;
    ser.serialize_field("hint", hint)?;
    ser.serialize_field(
        "openssl_error",
        &openssl_error.as_ref().map(|e| e.to_string()),
    )?;
    ser.end()
}

fn serialize_invalid_data<S>(
    error: &String,
    backtrace: &Backtrace,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("InvalidData", 2)?;
    ser.serialize_field("error", error)?;
    ser.serialize_field("backtrace", &backtrace.to_string())?;
    ser.end()
}

fn serialize_unique_key_violation<S>(
    constraint: &&str,
    backtrace: &Backtrace,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("UniqueKeyViolation", 2)?;
    ser.serialize_field("constraint", constraint)?;
    ser.serialize_field("backtrace", &backtrace.to_string())?;
    ser.end()
}

impl From<PgError> for DBError {
    fn from(error: PgError) -> Self {
        Self::PostgresError {
            error: Box::new(error),
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<PoolError> for DBError {
    fn from(error: PoolError) -> Self {
        Self::PostgresPoolError {
            error: Box::new(error),
            backtrace: Backtrace::capture(),
        }
    }
}

impl Display for DBError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DBError::PostgresError { error, .. } => {
                write!(f, "Unexpected Postgres error: '{error}'")
            }
            DBError::PostgresPoolError { error, .. } => {
                write!(f, "Postgres connection pool error: '{error}'")
            }
            DBError::PoolBuild { error } => {
                write!(f, "Unable to build the Postgres connection pool: '{error}'")
            }
            DBError::TlsConnection {
                hint,
                openssl_error,
            } => match openssl_error {
                Some(e) => write!(f, "{hint}: '{e}'"),
                None => write!(f, "{hint}"),
            },
            DBError::TransactionTimeout { timeout } => {
                write!(
                    f,
                    "Database transaction did not complete within {}s",
                    timeout.as_secs_f64()
                )
            }
            DBError::InvalidData { error, .. } => {
                write!(f, "Invalid database data '{error}'")
            }
            DBError::UniqueKeyViolation { constraint, .. } => {
                write!(f, "Unique key violation for '{constraint}'")
            }
            DBError::DuplicateName { space_id, name } => {
                write!(
                    f,
                    "A pipeline environment named '{name}' already exists in space {space_id}"
                )
            }
            DBError::UnknownPipelineEnvironment { space_id } => {
                write!(f, "No pipeline environment found for space {space_id}")
            }
        }
    }
}

impl StdError for DBError {}

impl DetailedError for DBError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::DuplicateName { .. } => Cow::from("data_conflict_error"),
            Self::UnknownPipelineEnvironment { .. } => Cow::from("not_found"),
            Self::PostgresError { .. }
            | Self::PostgresPoolError { .. }
            | Self::PoolBuild { .. }
            | Self::TlsConnection { .. }
            | Self::TransactionTimeout { .. }
            | Self::InvalidData { .. }
            | Self::UniqueKeyViolation { .. } => Cow::from("internal_error"),
        }
    }
}

impl ResponseError for DBError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::PostgresError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PostgresPoolError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PoolBuild { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TlsConnection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TransactionTimeout { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidData { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UniqueKeyViolation { .. } => StatusCode::INTERNAL_SERVER_ERROR, // UUID conflict
            Self::DuplicateName { .. } => StatusCode::CONFLICT,
            Self::UnknownPipelineEnvironment { .. } => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        error_response(self)
    }
}
