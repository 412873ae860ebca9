use thiserror::Error;
use uuid::Uuid;

/// Errors the dispatch core can produce. Variants map 1:1 onto the error
/// kinds: most are expected, recovered-from conditions a worker or poller
/// handles internally and only logs; only `NotFound`, `Conflict` and
/// `Validation` are meant to reach an HTTP client.
#[derive(Debug, Error)]
pub enum TorqueError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task {0} already exists")]
    Conflict(Uuid),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("commit for task {0} rejected: attempts fence moved from {expected} to a different value", expected = .1)]
    FencingRejected(Uuid, i32),

    #[error("task store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("notify bus unavailable: {0}")]
    BusUnavailable(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Log level an occurrence of this error should be reported at, matching how
/// loudly each kind deserves to be noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warn,
    Error,
}

impl TorqueError {
    /// HTTP status the ingress layer should translate this into. Only
    /// meaningful for errors that originate from a request; internal/store
    /// errors still get a status in case a handler bubbles one up directly,
    /// but callers should prefer catching those before they reach a response.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TorqueError::NotFound(_) => 404,
            TorqueError::Conflict(_) => 409,
            TorqueError::Validation(_) => 400,
            TorqueError::FencingRejected(..) => 409,
            TorqueError::StoreUnavailable(_) => 503,
            TorqueError::BusUnavailable(_) => 503,
            TorqueError::Internal(_) => 500,
        }
    }

    /// Whether the caller (a worker, the poller) can simply move on, or
    /// whether this represents a real failure that should surface.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TorqueError::FencingRejected(..)
                | TorqueError::StoreUnavailable(_)
                | TorqueError::BusUnavailable(_)
        )
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            TorqueError::FencingRejected(..) => LogLevel::Warn,
            TorqueError::StoreUnavailable(_) => LogLevel::Warn,
            TorqueError::BusUnavailable(_) => LogLevel::Warn,
            TorqueError::NotFound(_) | TorqueError::Conflict(_) | TorqueError::Validation(_) => {
                LogLevel::Debug
            }
            TorqueError::Internal(_) => LogLevel::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, TorqueError>;
