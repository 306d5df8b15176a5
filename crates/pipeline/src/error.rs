/// Failure inside one pipeline stage.
///
/// The worker records these on the job as a failure message; they never reach
/// the submitter directly.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Render(String),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("{0}")]
    Style(String),

    #[error("{0}")]
    Archive(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}
