use thiserror::Error;

/// Fixed message shown when the session is torn down after a business 401.
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired, please sign in again";

/// Unified error type for the studio client core.
///
/// Every failure a caller can observe goes through this enum; crypto failures
/// are deliberately absent because they are absorbed inside the pipeline
/// (plaintext fallback / raw passthrough) and never escape.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx transport status or a low-level network failure.
    #[error("{message}")]
    Transport { status: u16, message: String },

    /// Business code 401 in the response envelope.
    #[error("{SESSION_EXPIRED_MESSAGE}")]
    Unauthorized,

    /// Any non-200, non-401 business code in the response envelope.
    #[error("{message}")]
    Business { code: i64, message: String },

    /// The pipeline-owned deadline elapsed before the response arrived.
    #[error("request timed out")]
    Timeout,

    /// A caller-supplied cancellation signal fired.
    ///
    /// Suppressed from default error display; surfacing it is the caller's
    /// decision since they triggered it.
    #[error("request cancelled")]
    Cancelled,

    /// A request required auth but no token was resolvable. Raised before any
    /// network I/O; display-suppressed so the caller can show a login prompt.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Numeric code carried to display/telemetry layers.
    pub fn code(&self) -> i64 {
        match self {
            Error::Transport { status, .. } => i64::from(*status),
            Error::Unauthorized => 401,
            Error::Business { code, .. } => *code,
            Error::Timeout => 408,
            Error::Cancelled => -2,
            Error::NotAuthenticated => -3,
            Error::Network(_) => -1,
            Error::Serialization(_) => -4,
            Error::InvalidUrl(_) => -5,
        }
    }

    /// Whether the default error display must stay silent for this error.
    ///
    /// Manual cancellation and the pre-flight "not authenticated" gate are
    /// surfaced by the caller (unmount cleanup, login prompt), not by the
    /// shared notifier.
    pub fn suppress_display(&self) -> bool {
        matches!(self, Error::Cancelled | Error::NotAuthenticated)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_suppression_covers_caller_owned_errors() {
        assert!(Error::Cancelled.suppress_display());
        assert!(Error::NotAuthenticated.suppress_display());
        assert!(!Error::Timeout.suppress_display());
        assert!(!Error::Unauthorized.suppress_display());
        assert!(!Error::Business {
            code: 500,
            message: "boom".into()
        }
        .suppress_display());
    }

    #[test]
    fn codes_round_trip() {
        assert_eq!(Error::Unauthorized.code(), 401);
        assert_eq!(
            Error::Transport {
                status: 502,
                message: "bad gateway".into()
            }
            .code(),
            502
        );
        assert_eq!(
            Error::Business {
                code: 1001,
                message: "quota".into()
            }
            .code(),
            1001
        );
    }
}
