use thiserror::Error;

/// Errors reported by the note detection engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Transform size the FFT framing cannot work with (odd or too small).
    #[error("unsupported transform size {0}: must be even and at least 8")]
    TransformSize(usize),

    #[error("invalid sample rate {0} Hz")]
    SampleRate(u32),

    /// Sample block handed to the analyzer was not exactly one transform long.
    #[error("expected block of {expected} samples, got {got}")]
    BlockSize { expected: usize, got: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
