use thiserror::Error;
use uuid::Uuid;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents a location document that failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Represents an ID that could not be parsed.
    #[error("Invalid ID {0}")]
    InvalidId(String),

    /// Represents an operation on a location that does not exist.
    #[error("Location {0} does not exist")]
    NonExistentId(Uuid),

    /// Represents a geospatial query with an unusable limit or radius.
    #[error("Invalid geospatial query: {reason}")]
    InvalidQuery { reason: &'static str },

    /// Represents a failure reported by a storage backend other than
    /// PostgreSQL.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },
}

/// Enumerates the ways a location document can fail validation. The
/// messages are shown to callers as-is.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Title is required")]
    TitleRequired,

    #[error("Title already exists")]
    TitleAlreadyExists,

    #[error("Please provide a valid url")]
    InvalidUrl,

    #[error("Please provide a valid email")]
    InvalidEmail,

    #[error("Please provide a valid https url")]
    InvalidCoverSrc,

    #[error("Coordinates must be [longitude, latitude] within range")]
    InvalidCoordinates,

    /// Covers undeclared fields, wrong types and unknown geometry types.
    #[error("{source}")]
    InvalidDocument { source: serde_json::Error },
}

impl ValidationError {
    /// Returns the path of the offending field, if a single field is to
    /// blame.
    pub fn field(&self) -> Option<&'static str> {
        use ValidationError::*;

        match self {
            TitleRequired | TitleAlreadyExists => Some("title"),
            InvalidUrl => Some("url"),
            InvalidEmail => Some("email"),
            InvalidCoverSrc => Some("cover.src"),
            InvalidCoordinates => Some("geometry.location.coordinates"),
            InvalidDocument { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(source: serde_json::Error) -> Self {
        ValidationError::InvalidDocument { source }
    }
}

/// Raised once if the geospatial index could not be built. Never
/// returned to callers; it is logged and dropped.
#[derive(Debug, Error)]
#[error("failed to build index {index}")]
pub struct IndexBuildError {
    pub index: String,
    pub source: BackendError,
}
