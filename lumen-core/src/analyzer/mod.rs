//! Audio and beat analysis
pub mod ema;
pub mod features;
pub mod samples;
pub mod signals;

pub use self::ema::EmaTracker;
pub use self::features::{AudioFeatureSampler, AudioFeatures, FeatureBuilder, Levels};
pub use self::samples::{Sample, SampleBuffer};
pub use self::signals::{SignalAnalyzer, SignalBuilder, Signals};

/// Amplitude of a signal, usually in `[0, 1]`
pub type SignalStrength = f32;
