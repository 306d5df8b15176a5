#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity exists but is not in a state that allows the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for the most common lookup failure.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: "Job",
            id: id.into(),
        }
    }
}
