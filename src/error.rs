use thiserror::Error;

/// Errors produced by the source resolution and ingestion workflow.
#[derive(Error, Debug)]
pub enum AstroDbError {
    /// The caller passed a parameter the store does not recognize, such as a
    /// coordinate column name that is not in the Sources table.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// More than one candidate was found where exactly one was required for an
    /// unambiguous alias/insert decision.
    #[error("more than one match for {name}: {matches:?}")]
    AmbiguousMatch { name: String, matches: Vec<String> },

    /// The discovery reference is blank or absent from the Publications table.
    #[error("{0}")]
    ReferenceMissing(String),

    /// Coordinates required for insertion could not be obtained locally or
    /// from the external resolver.
    #[error("coordinates are needed for {0} and could not be obtained")]
    CoordinatesUnavailable(String),

    /// The store rejected a write due to a uniqueness or referential
    /// constraint.
    #[error("{0}")]
    ConstraintViolation(String),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("name resolver error: {0}")]
    Resolver(#[from] reqwest::Error),
}

impl AstroDbError {
    /// Whether this error is an ingest rejection that `raise_error = false`
    /// may convert into a structured failure outcome. Input-validation and
    /// infrastructure errors are never suppressed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AstroDbError::AmbiguousMatch { .. }
                | AstroDbError::ReferenceMissing(_)
                | AstroDbError::CoordinatesUnavailable(_)
                | AstroDbError::ConstraintViolation(_)
        )
    }
}
