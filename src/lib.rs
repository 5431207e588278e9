//! Golf swing analysis: frames in, phases, features, classification and coaching feedback out.

pub mod analysis;
pub mod carry;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod feedback;
pub mod frame;
pub mod geometry;
pub mod motion;
pub mod normalize;
pub mod phases;
pub mod pose;
pub mod quality;
pub mod remote;
pub mod synthetic;

pub use analysis::{AnalysisFlags, CancelFlag, Progress, SwingAnalysisResult, SwingAnalyzer};
pub use classifier::{ClassificationResult, ModelBundle, ModelStore, SwingClassifier, SwingLabel};
pub use config::AnalyzerConfig;
pub use error::{AnalysisError, Result};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use frame::{FfmpegFrameSource, FrameSource, ImageSequenceSource, MemoryFrameSource};
pub use pose::{PoseEstimator, PoseTrack};
