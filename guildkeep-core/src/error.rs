//! Error types for the progression and economy engine.

use chrono::Duration;
use thiserror::Error;

/// Failure of the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Tagged outcome of a failed engine operation.
///
/// Only [`EngineError::StoreUnavailable`] represents a fault; every other
/// variant is an ordinary user-visible result.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The operation is rate-limited.
    #[error("On cooldown for another {}s", retry_after.num_seconds())]
    Cooldown {
        /// Time until the operation becomes available.
        retry_after: Duration,
    },

    /// The wallet is below the cost.
    #[error("Insufficient funds: missing {missing}")]
    Insufficient {
        /// Shortfall.
        missing: u64,
    },

    /// The role is not for sale in this guild.
    #[error("Item is not listed in the shop")]
    NotListed,

    /// The member already holds the role being bought.
    #[error("Role already owned")]
    AlreadyOwned,

    /// The platform refused an action.
    #[error("Platform refused the action: {0}")]
    Forbidden(String),

    /// Persistence I/O failed; nothing was applied.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Input was rejected.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },

    /// Caller lacks required permissions.
    #[error("Missing permission: {required}")]
    PermissionDenied {
        /// Name of the missing permission.
        required: String,
    },
}

impl EngineError {
    /// Shorthand for [`EngineError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether this is an ordinary outcome to report to the user, as opposed
    /// to a fault that should be logged as an error.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreUnavailable(StoreError::Database(err))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
