use thiserror::Error;

/// Errors returned by a single swing analysis.
///
/// Every variant is fatal for the request that produced it, never for the process.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The media has no visual stream to decode
    #[error("No video track in {0}")]
    NoVideoTrack(String),

    /// Decoded clip is shorter than the minimum the segmenter needs
    #[error("Insufficient frames: decoded {decoded}, need at least {required}")]
    InsufficientFrames { decoded: usize, required: usize },

    /// Decoder process or image decoding failed
    #[error("Video decode error: {0}")]
    Decode(String),

    /// Too few usable poses (or breakpoints) to trust phase boundaries
    #[error("Tracking failed: {0}")]
    TrackingFailed(String),

    #[error("Invalid feature count: expected {expected}, got {actual}")]
    InvalidFeatureCount { expected: usize, actual: usize },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    /// Model or normalization artifact exists but cannot be used
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
