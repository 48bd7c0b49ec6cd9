//! Error handling for the Profile SDK
//!
//! Two layers of errors live here:
//! - `ServiceError`: what a directory backend call can fail with. It stays
//!   inside the SDK and is never handed to a profile consumer.
//! - `RefreshError`: the taxonomy a consumer of `ProfileAggregator` sees.

use std::fmt;
use std::collections::HashMap;
use thiserror::Error;

use crate::aggregator::CycleToken;

pub mod mapping;

/// Result type for directory backend operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failure of a single directory backend call
///
/// Constructors mirror the variants. Context (status code, request id,
/// endpoint) is attached as an outer `WithContext` layer; use `root()` to
/// classify an error regardless of how many layers it carries.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Connection failures and transient gateway errors (502/503)
    #[error("Network error: {0}")]
    Network(String),

    /// Missing, expired or rejected bearer token (401)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Token lacks the directory permission for this call (403)
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Throttled by the directory (429)
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Any other non-success status
    #[error("Service error: {0}")]
    Service(String),

    /// Malformed request, e.g. an invalid `$select` (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Body did not match the expected record shape
    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request or facet deadline expired (408/504 or a local timeout)
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The user or related object does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ServiceError::Authorization(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        ServiceError::RateLimit(message.into())
    }

    pub fn service(message: impl Into<String>) -> Self {
        ServiceError::Service(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        match self {
            ServiceError::WithContext { inner, mut context } => {
                context.add(key, value);
                ServiceError::WithContext { inner, context }
            }
            other => {
                let mut context = ErrorContext::new();
                context.add(key, value);
                other.with_context(context)
            }
        }
    }

    /// The error with any context layers stripped
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Directory error code of the outermost context layer
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ServiceError::WithContext { context, .. } => context.error_code.as_deref(),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::WithContext { context, .. } => context.status_code,
            _ => None,
        }
    }

    /// Get the request ID the directory service saw, if known
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServiceError::WithContext { context, .. } => context.request_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ServiceError::NotFound(_))
    }

    /// Whether a retry may succeed: connection trouble, timeouts and
    /// throttling
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            ServiceError::Network(_) | ServiceError::Timeout(_) | ServiceError::RateLimit(_)
        )
    }
}

/// Where and when a directory call failed
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub service: String,

    /// When the failure was observed
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    pub status_code: Option<u16>,

    /// Directory error code such as `Request_ResourceNotFound`
    pub error_code: Option<String>,

    /// `client-request-id` sent with the call
    pub request_id: Option<String>,

    /// Request path, e.g. `/v1.0/users/{id}/manager`
    pub endpoint: Option<String>,

    /// Free-form extras (`attempts`, `server_request_id`, `category`)
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "unknown".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            error_code: None,
            request_id: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific service
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let mut context = ErrorContext::for_service("directory");
        if let Some(url) = err.url() {
            context = context.endpoint(url.path());
        }
        if let Some(status) = err.status() {
            context = context.status_code(status.as_u16());
        }

        let error = match () {
            _ if err.is_timeout() => ServiceError::timeout(format!("Request timed out: {}", err)),
            _ if err.is_connect() => ServiceError::network(format!("Connection error: {}", err)),
            _ if err.is_request() || err.is_redirect() => ServiceError::network(format!("Request failed: {}", err)),
            _ if err.is_decode() || err.is_body() => ServiceError::parsing(format!("Response decode error: {}", err)),
            _ => ServiceError::internal(format!("HTTP client error: {}", err)),
        };

        error.with_context(context)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("Invalid directory JSON: {}", err))
    }
}

/// Errors reported to a consumer of `ProfileAggregator::refresh`
///
/// Secondary facet failures never show up here: they are absorbed into the
/// snapshot's field status map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The mandatory core-user fetch failed; there is nothing to show.
    #[error("Core profile unavailable for user {user_id}: {reason}")]
    CoreProfileUnavailable {
        user_id: String,
        reason: String,
    },

    /// The cycle was cancelled or superseded by a newer refresh. Not a
    /// failure: no snapshot and no field statuses are reported for it.
    #[error("Refresh cycle {cycle} was cancelled")]
    Cancelled { cycle: CycleToken },

    /// The user identifier was empty
    #[error("User identifier must not be empty")]
    InvalidUserId,
}

impl RefreshError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RefreshError::Cancelled { .. })
    }

    pub fn is_core_unavailable(&self) -> bool {
        matches!(self, RefreshError::CoreProfileUnavailable { .. })
    }
}
