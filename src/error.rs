// ⚠️ Error Types - what can go wrong while tracking rulemaking
// Library code returns these; binaries wrap them with anyhow context.

/// Result type for regtrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the storage, fetch and resolution layers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Document has no Regulatory Identification Number - not a trackable regulation
    #[error("document has no RIN")]
    MissingIdentity,

    /// Lookup by natural key or id found nothing
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Upstream API answered with a non-success status
    #[error("upstream returned HTTP {status}")]
    UpstreamStatus { status: u16 },

    /// Environment variable present but unusable
    #[error("invalid configuration value for {key}: {value:?}")]
    Config { key: &'static str, value: String },

    // Transparent wrappers for underlying crate errors
    /// SQLite error (constraint violations included)
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    /// Network / transport error talking to the upstream API
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors the scheduler can expect to clear up on the next run
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::UpstreamStatus { .. })
    }

    /// True when SQLite rejected a write because of a UNIQUE/FK constraint
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Storage(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
