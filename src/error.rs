pub type DraperyResult<T> = Result<T, DraperyError>;

/// Top-level error taxonomy surfaced by pipeline dispatch.
///
/// Preprocessing stages never produce these; their failures are absorbed by
/// the orchestrator (see [`StageError`]).
#[derive(thiserror::Error, Debug)]
pub enum DraperyError {
    /// No external command configured and the local fallback is disabled.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external inference command ran and exited non-zero.
    #[error("external process error: {0}")]
    ExternalProcess(String),

    /// The external inference command exited 0 but wrote no output artifact.
    #[error("missing output error: {0}")]
    MissingOutput(String),

    /// Invalid caller-provided data (buffer shape, rectangle bounds).
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DraperyError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn external_process(msg: impl Into<String>) -> Self {
        Self::ExternalProcess(msg.into())
    }

    pub fn missing_output(msg: impl Into<String>) -> Self {
        Self::MissingOutput(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the error should map to a client-facing failure rather than an
    /// opaque internal one. Internal detail of `Other` is never leaked.
    pub fn client_facing(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ExternalProcess(_) | Self::MissingOutput(_)
        )
    }
}

/// Failure of a best-effort preprocessing stage.
///
/// Stages return these explicitly; the orchestrator keeps the previous
/// artifact and moves on. A `StageError` never escapes the pipeline.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageError {
    #[error("image too small to segment")]
    TooSmall,

    #[error("segmentation classified no foreground pixels")]
    EmptyForeground,

    #[error("image has no alpha channel")]
    NoAlpha,

    #[error("image has no pixels with non-zero alpha")]
    FullyTransparent,

    #[error("crop region below minimum area fraction")]
    CropTooSmall,
}
