//! Platform error types.

use std::time::Duration;

use thiserror::Error;

/// Errors a chat platform can return.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform refused the action (missing permission, role hierarchy).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The member, role or channel does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Too many requests; try again after `retry_after`.
    #[error("Rate limited, retry after {}ms", retry_after.as_millis())]
    RateLimited {
        /// Server-provided wait.
        retry_after: Duration,
    },

    /// Gateway or API temporarily unavailable.
    #[error("Platform unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All {attempts} attempts failed: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Message of the final failure.
        last_error: String,
    },
}

impl PlatformError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable(_))
    }
}

impl From<PlatformError> for guildkeep_core::EngineError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound(what) => Self::invalid(format!("{what} not found")),
            other => Self::Forbidden(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildkeep_core::EngineError;

    #[test]
    fn transient_classification() {
        assert!(PlatformError::Unavailable("gateway".into()).is_transient());
        assert!(PlatformError::RateLimited {
            retry_after: Duration::from_millis(5)
        }
        .is_transient());
        assert!(!PlatformError::Forbidden("hierarchy".into()).is_transient());
        assert!(!PlatformError::NotFound("role".into()).is_transient());
    }

    #[test]
    fn maps_into_engine_errors() {
        let forbidden: EngineError = PlatformError::Forbidden("hierarchy".into()).into();
        assert!(matches!(forbidden, EngineError::Forbidden(_)));
        let missing: EngineError = PlatformError::NotFound("member".into()).into();
        assert!(matches!(missing, EngineError::InvalidArgument { .. }));
    }
}
