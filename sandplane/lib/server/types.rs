use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{models::SandboxState, ErrorKind, SandplaneError, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Query string of `GET /sandboxes`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// Comma-separated states, `running` and/or `paused`.
    pub state: Option<String>,

    /// URL-encoded `key=value` pairs joined by `&`.
    pub metadata: Option<String>,

    /// The page size.
    pub limit: Option<u32>,

    /// The token from the previous page's `X-Next-Token` header.
    pub next_token: Option<String>,
}

/// Body of `POST /sandboxes/{id}/timeout`.
#[derive(Debug, Deserialize)]
pub struct TimeoutRequest {
    /// Seconds from now until the sandbox's deadline.
    pub timeout: u64,
}

/// Body of `POST /sandboxes/{id}/refreshes`.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    /// Seconds from now; the default sandbox timeout when absent.
    #[serde(default)]
    pub duration: Option<u64>,
}

/// Body of `PUT /sandboxes/{id}/metadata`.
#[derive(Debug, Deserialize)]
pub struct MetadataRequest {
    /// The new labels, replacing the old ones.
    pub metadata: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: String,
}

//--------------------------------------------------------------------------------------------------
// Types: Error Response
//--------------------------------------------------------------------------------------------------

/// Standard error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code
    pub code: u16,

    /// Error message
    pub message: String,

    /// Error type for categorizing errors
    pub error_type: ErrorType,

    /// Optional additional details about the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Types of errors that can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Invalid request parameters or body
    ValidationError,

    /// Missing or unknown team
    AuthenticationError,

    /// The team may not touch the resource
    PermissionError,

    /// The team is at its sandbox limit
    QuotaError,

    /// Resource not found
    NotFound,

    /// The sandbox already moved on
    Conflict,

    /// Slow down
    RateLimited,

    /// Try again later
    Unavailable,

    /// Internal server errors
    InternalError,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ListParams {
    /// The requested states, if any.
    pub fn states(&self) -> SandplaneResult<Option<Vec<SandboxState>>> {
        let Some(raw) = self.state.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        raw.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect::<SandplaneResult<Vec<_>>>()
            .map(Some)
    }

    /// The metadata filter.
    pub fn metadata(&self) -> SandplaneResult<HashMap<String, String>> {
        match self.metadata.as_deref() {
            Some(raw) => parse_metadata(raw),
            None => Ok(HashMap::new()),
        }
    }
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: u16, message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            code,
            message: message.into(),
            error_type,
            details: None,
        }
    }

    /// Add details to the error response, ignoring details for 500-level errors
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        if self.code < 500 {
            self.details = Some(details.into());
        }
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses `k=v&k2=v2` into a map. A pair without `=` or with an empty key is rejected.
pub fn parse_metadata(raw: &str) -> SandplaneResult<HashMap<String, String>> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(SandplaneError::InvalidArgument(format!(
                "invalid metadata filter '{pair}', expected key=value"
            ))),
        })
        .collect()
}

/// The status code and error type of an error kind.
pub fn status_of(kind: ErrorKind) -> (StatusCode, ErrorType) {
    match kind {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, ErrorType::NotFound),
        ErrorKind::Conflict => (StatusCode::CONFLICT, ErrorType::Conflict),
        ErrorKind::Forbidden => (StatusCode::FORBIDDEN, ErrorType::PermissionError),
        ErrorKind::QuotaExceeded => (StatusCode::FORBIDDEN, ErrorType::QuotaError),
        ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorType::AuthenticationError),
        ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, ErrorType::ValidationError),
        ErrorKind::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, ErrorType::RateLimited),
        ErrorKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, ErrorType::Unavailable),
        ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, ErrorType::InternalError),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl IntoResponse for SandplaneError {
    fn into_response(self) -> Response {
        let (status, error_type) = status_of(self.kind());

        let message = match self.kind() {
            ErrorKind::NotFound => "not found".to_string(),
            ErrorKind::Conflict => "conflict".to_string(),
            ErrorKind::Forbidden => "forbidden".to_string(),
            ErrorKind::Unauthorized => "unauthorized".to_string(),
            ErrorKind::QuotaExceeded => self.to_string(),
            ErrorKind::InvalidArgument => "invalid request".to_string(),
            ErrorKind::TooManyRequests => "too many requests".to_string(),
            ErrorKind::Unavailable => {
                tracing::warn!(error = %self, "request rejected");
                "service unavailable, please retry".to_string()
            }
            ErrorKind::Internal => {
                tracing::error!(error = %self, "request failed");
                "internal server error".to_string()
            }
        };

        let body =
            ErrorResponse::new(status.as_u16(), message, error_type).with_details(self.to_string());

        (status, Json(body)).into_response()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
