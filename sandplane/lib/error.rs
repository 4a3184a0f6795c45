use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a sandplane-related operation.
pub type SandplaneResult<T> = Result<T, SandplaneError>;

/// An error that occurred while operating the sandbox control plane.
#[derive(Debug, Error)]
pub enum SandplaneError {
    /// The sandbox, snapshot, team or template does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The sandbox has already transitioned to the requested state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller does not own the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The caller could not be identified.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The team reached its concurrent sandbox limit.
    #[error("you have reached the maximum number of concurrent sandboxes ({limit})")]
    QuotaExceeded {
        /// The team's configured limit.
        limit: u32,
    },

    /// The request is malformed or out of bounds.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The template collaborator asked the caller to slow down.
    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// The admission limiter is saturated or the wait was abandoned.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A node or store failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration parsing error.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// The error taxonomy callers reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing to act on.
    NotFound,

    /// State already transitioned.
    Conflict,

    /// Ownership mismatch.
    Forbidden,

    /// Caller not identified.
    Unauthorized,

    /// Team limit reached.
    QuotaExceeded,

    /// Bad request.
    InvalidArgument,

    /// Rate limited by a collaborator.
    TooManyRequests,

    /// Admission limiter saturated.
    Unavailable,

    /// Node or store failure.
    Internal,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandplaneError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> SandplaneError {
        SandplaneError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns where the error sits in the control plane's taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandplaneError::NotFound(_) => ErrorKind::NotFound,
            SandplaneError::Conflict(_) => ErrorKind::Conflict,
            SandplaneError::Forbidden(_) => ErrorKind::Forbidden,
            SandplaneError::Unauthorized(_) => ErrorKind::Unauthorized,
            SandplaneError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            SandplaneError::InvalidArgument(_) | SandplaneError::Config(_) => {
                ErrorKind::InvalidArgument
            }
            SandplaneError::TooManyRequests(_) => ErrorKind::TooManyRequests,
            SandplaneError::Unavailable(_) => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    ///
    /// Node and store failures are retryable; ownership, validation, quota and state errors are
    /// terminal until the caller has new information.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal | ErrorKind::Unavailable)
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `SandplaneResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> SandplaneResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
