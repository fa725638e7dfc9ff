use thiserror::Error;

/// Local validation failures, raised before any network call.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("interaction field `{0}` is not allowed")]
    DisallowedField(String),

    #[error("interaction is missing a type")]
    MissingInteractionType,

    #[error("unknown interaction type: {0}")]
    UnknownInteractionType(String),

    #[error("invalid value for interaction field `{0}`")]
    InvalidField(&'static str),

    #[error("progress must be a finite number, got {0}")]
    NonFiniteProgress(f64),

    #[error("elapsed time must be finite and non-negative, got {0}")]
    InvalidElapsed(f64),
}

/// Failures translating between server records and local log state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MappingError {
    #[error("expected a JSON object for {0}")]
    NotAnObject(&'static str),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}
