/// Errors raised by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A versioned row moved underneath the change set, or a unique key was hit.
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Failure result of every seat and booking operation.
///
/// Each variant names the violated precondition in a readable message; the
/// caller decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Expired(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Store failure: {0}")]
    Store(StoreError),
}

impl BookingError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        BookingError::NotFound(format!("{} {} not found", entity, id))
    }

    /// Short machine-friendly label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::Conflict(_) => "conflict",
            BookingError::Validation(_) => "validation",
            BookingError::Expired(_) => "expired",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => BookingError::Conflict(msg),
            other => BookingError::Store(other),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
