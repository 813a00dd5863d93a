use thiserror::Error;

/// Failure taxonomy for the transform core.
///
/// The adapter and parser fail fast with these; the response extractor never
/// fails (a fully exhausted strategy chain is a successful `Text`/`NotFound`
/// return, which the pipeline maps to `NoImageProduced` when a generation
/// call ends with no usable output).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("invalid image data: {0}")]
    InvalidImageData(String),

    #[error("{backend} request failed{}: {detail}", .status.map(|code| format!(" ({code})")).unwrap_or_default())]
    NetworkFailure {
        backend: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("malformed analysis payload: {0}")]
    MalformedAnalysis(String),

    #[error("model produced no usable image output")]
    NoImageProduced,
}

impl EngineError {
    pub fn network(backend: impl Into<String>, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::NetworkFailure {
            backend: backend.into(),
            status,
            detail: detail.into(),
        }
    }
}
