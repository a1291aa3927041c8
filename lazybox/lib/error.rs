use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a lazybox-related operation.
pub type LazyboxResult<T> = Result<T, LazyboxError>;

/// An error that occurred while managing or routing to a sandbox.
#[derive(Debug, Error)]
pub enum LazyboxError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during a database operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while running database migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error that occurred when (de)serializing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred when parsing a configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// The input was missing a field or contained a malformed one.
    #[error("validation error: {0}")]
    Validation(String),

    /// No sandbox record exists for the given uuid or domain.
    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),

    /// No schedule exists with the given name.
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    /// The resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The host header does not decompose into a routing key.
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// The host belongs to a base domain this gateway does not serve.
    #[error("domain mismatch: {0}")]
    DomainMismatch(String),

    /// The request method cannot be forwarded.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A collaborator answered with an unexpected status.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A persisted lifecycle state could not be parsed.
    #[error("invalid sandbox status: {0}")]
    InvalidStatus(String),

    /// The configuration is not usable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LazyboxError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> LazyboxError {
        LazyboxError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns `true` if the error reports a missing sandbox or schedule.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LazyboxError::SandboxNotFound(_) | LazyboxError::ScheduleNotFound(_)
        )
    }

    /// Returns `true` if the error reports an already existing resource.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LazyboxError::Conflict(_))
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

/// Creates an `Ok` `LazyboxResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> LazyboxResult<T> {
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
