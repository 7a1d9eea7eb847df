use actix_web::body::BoxBody;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, HttpResponseBuilder, ResponseError};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{borrow::Cow, error::Error as StdError};
use utoipa::ToSchema;
use uuid::Uuid;

/// Media type of JSON-API documents.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// One error of a JSON-API error document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorObject {
    /// Identifier of this particular occurrence of the error.
    ///
    /// The same identifier is written to the service log and returned in the
    /// `Location` header of the response.
    pub id: Uuid,
    /// Error code is a string that specifies this error type.
    #[schema(example = "data_conflict_error")]
    pub code: Cow<'static, str>,
    /// HTTP status code, as a string.
    #[schema(example = "409")]
    pub status: String,
    /// Short summary of the status.
    #[schema(example = "Conflict")]
    pub title: String,
    /// Human-readable error message.
    pub detail: String,
    /// Detailed error metadata.
    /// The contents of this field is determined by `code`.
    #[schema(value_type=Object)]
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub meta: JsonValue,
}

/// Information returned by REST API endpoints on error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorObject>,
}

/// Error trait which internal errors must implement such that it
/// can be transformed to a complete JSON error response.
pub trait DetailedError: StdError + ResponseError + Serialize {
    /// Identifying name of the error.
    fn error_code(&self) -> Cow<'static, str>;
}

impl<E> From<&E> for ErrorResponse
where
    E: DetailedError,
{
    fn from(error: &E) -> ErrorResponse {
        Self::from_error(error)
    }
}

impl ErrorResponse {
    /// Transform the detailed error to a JSON-API error document.
    /// - The detail is retrieved using `to_string()` (available due to trait `StdError`)
    /// - The status code determines the level of the log statement
    ///   (available due to trait `ResponseError`)
    /// - The metadata is retrieved by serializing to JSON (available due to trait `Serialize`)
    pub fn from_error<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let response = Self::from_error_nolog(error);
        let status = error.status_code();
        let (id, code, detail) = match response.errors.first() {
            Some(object) => (object.id, object.code.clone(), object.detail.as_str()),
            None => return response,
        };

        if status.is_success() {
            error!(
                "[HTTP error (caused by implementation)] expected error but got success status code {status} {code} (error {id}): {detail}"
            );
        } else if status.is_client_error() {
            info!("[HTTP error (caused by client)] {status} {code} (error {id}): {detail}");
        } else if status == StatusCode::SERVICE_UNAVAILABLE {
            info!("[HTTP error] {status} {code} (error {id}): {detail}");
        } else {
            error!(
                "[HTTP error (caused by implementation)] {status} {code} (error {id}): {detail}"
            );
        }

        // Print error backtrace if available for an internal server error
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            if let Some(backtrace) = response
                .errors
                .first()
                .and_then(|object| object.meta.get("backtrace"))
                .and_then(JsonValue::as_str)
            {
                error!("Error {id} backtrace:\n{backtrace}");
            }
        }

        response
    }

    pub fn from_error_nolog<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let status = error.status_code();
        let meta = serde_json::to_value(error).unwrap_or_else(|e| {
            JsonValue::String(format!("Failed to serialize error. Details: '{e}'"))
        });

        Self {
            errors: vec![ErrorObject {
                id: Uuid::new_v4(),
                code: error.error_code(),
                status: status.as_u16().to_string(),
                title: status.canonical_reason().unwrap_or("Error").to_string(),
                detail: error.to_string(),
                meta,
            }],
        }
    }

    /// Value of the `Location` header pointing at the logged error.
    pub fn location(&self) -> Option<String> {
        self.errors
            .first()
            .map(|object| format!("urn:uuid:{}", object.id))
    }
}

/// Build the HTTP response for an error: the JSON-API error document as body
/// and its identifier in the `Location` header.
///
/// Intended to back the `error_response()` of every [`ResponseError`]
/// implementation.
pub fn error_response<E>(error: &E) -> HttpResponse<BoxBody>
where
    E: DetailedError,
{
    let response = ErrorResponse::from_error(error);
    let mut builder = HttpResponseBuilder::new(error.status_code());
    builder.content_type(JSONAPI_MEDIA_TYPE);
    if let Some(location) = response.location() {
        builder.insert_header((header::LOCATION, location));
    }
    builder.json(response)
}
