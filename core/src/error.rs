use thiserror::Error;

/// Errors surfaced by the job-control collaborators and the attach engine.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The job is not in a state that allows the requested operation, e.g. a
    /// resize pushed after the job already finished.
    #[error("job is not in a valid state for this operation")]
    InvalidState,

    #[error("stream closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
