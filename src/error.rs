pub type VoxalignResult<T> = Result<T, VoxalignError>;

/// Crate-wide error taxonomy.
///
/// The "imported as general transform" condition is deliberately not an
/// error; it is reported as [`crate::importer::ImportOutcome::GeneralFallback`]
/// so the caller can decide whether to proceed.
#[derive(thiserror::Error, Debug)]
pub enum VoxalignError {
    /// A required volume/sequence/transform reference was absent.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// The registration strategy name was not recognized.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// The external optimizer failed or produced no readable artifact.
    #[error("backend process error: {0}")]
    BackendProcess(String),

    /// A scene lookup or sequence frame resolution failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid argument or malformed data.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VoxalignError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn unknown_strategy(msg: impl Into<String>) -> Self {
        Self::UnknownStrategy(msg.into())
    }

    pub fn backend_process(msg: impl Into<String>) -> Self {
        Self::BackendProcess(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
