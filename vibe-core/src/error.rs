use thiserror::Error;

/// Per-request failures. Every variant is recovered at the request boundary
/// and rendered as the status text of an [`crate::EditResult`]; none of them
/// terminates the process or invalidates the loaded session.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("No image uploaded")]
    MissingInput,

    #[error("Could not read input image: {0}")]
    InvalidInput(String),

    /// The inference capability raised. Carries the underlying message so the
    /// user can tell what the pipeline complained about.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Writing the artifact failed. Kept separate from [`EditError::Generation`]
    /// so "model failed" and "disk failed" stay distinguishable.
    #[error("Could not save result: {0}")]
    Persist(#[from] image::ImageError),
}
