//! Band levels of an audio stream
//!
//! The [`AudioFeatureSampler`] taps a [`SampleBuffer`](super::SampleBuffer) through
//! three parallel paths (unfiltered, low-pass and high-pass) and reports RMS and peak
//! amplitude of each path over a sliding window.  Filters keep their state between
//! calls and only ever see each sample once.
use crate::analyzer;
use crate::error::{Error, Result};
use biquad::Biquad;
use std::collections;

/// Amplitude of one signal path
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levels {
    pub rms: analyzer::SignalStrength,
    pub peak: analyzer::SignalStrength,
}

/// Levels of all three paths
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFeatures {
    pub full: Levels,
    pub low: Levels,
    pub high: Levels,
}

#[derive(Debug, Default)]
pub struct FeatureBuilder {
    /// Number of samples the levels are computed over
    ///
    /// Can also be set from config as `"audio.window"`.
    pub window: Option<usize>,

    /// Cutoff of the low-pass path in Hz
    ///
    /// Can also be set from config as `"audio.low_cutoff"`.
    pub low_cutoff: Option<f32>,

    /// Cutoff of the high-pass path in Hz
    ///
    /// Can also be set from config as `"audio.high_cutoff"`.
    pub high_cutoff: Option<f32>,
}

impl FeatureBuilder {
    pub fn new() -> FeatureBuilder {
        Default::default()
    }

    pub fn window(&mut self, window: usize) -> &mut FeatureBuilder {
        self.window = Some(window);
        self
    }

    pub fn low_cutoff(&mut self, hz: f32) -> &mut FeatureBuilder {
        self.low_cutoff = Some(hz);
        self
    }

    pub fn high_cutoff(&mut self, hz: f32) -> &mut FeatureBuilder {
        self.high_cutoff = Some(hz);
        self
    }

    pub fn build(&mut self, buffer: analyzer::SampleBuffer) -> Result<AudioFeatureSampler> {
        let window = self
            .window
            .unwrap_or_else(|| crate::CONFIG.get_or("audio.window", 1024));
        let low_cutoff = self
            .low_cutoff
            .unwrap_or_else(|| crate::CONFIG.get_or("audio.low_cutoff", 150.0));
        let high_cutoff = self
            .high_cutoff
            .unwrap_or_else(|| crate::CONFIG.get_or("audio.high_cutoff", 4000.0));

        AudioFeatureSampler::new(buffer, window, low_cutoff, high_cutoff)
    }
}

fn filter(
    kind: biquad::Type<f32>,
    rate: usize,
    cutoff: f32,
) -> Result<biquad::DirectForm2Transposed<f32>> {
    let fs = biquad::Hertz::<f32>::from_hz(rate as f32)
        .map_err(|e| Error::Filter(format!("sample rate {}: {:?}", rate, e)))?;
    let f0 = biquad::Hertz::<f32>::from_hz(cutoff)
        .map_err(|e| Error::Filter(format!("cutoff {}: {:?}", cutoff, e)))?;
    let coeffs =
        biquad::Coefficients::<f32>::from_params(kind, fs, f0, biquad::Q_BUTTERWORTH_F32)
            .map_err(|e| Error::Filter(format!("cutoff {} at {} Hz: {:?}", cutoff, rate, e)))?;

    Ok(biquad::DirectForm2Transposed::<f32>::new(coeffs))
}

/// Sliding window over one filtered path
#[derive(Debug)]
struct Path {
    window: collections::VecDeque<analyzer::Sample>,
    sum_sq: f64,
    capacity: usize,
}

impl Path {
    fn new(capacity: usize) -> Path {
        Path {
            window: collections::VecDeque::with_capacity(capacity),
            sum_sq: 0.0,
            capacity,
        }
    }

    fn push(&mut self, s: analyzer::Sample) {
        if self.window.len() == self.capacity {
            if let Some(old) = self.window.pop_front() {
                self.sum_sq -= (old as f64).powi(2);
            }
        }
        self.window.push_back(s);
        self.sum_sq += (s as f64).powi(2);
    }

    fn levels(&self) -> Levels {
        if self.window.is_empty() {
            return Levels::default();
        }
        Levels {
            rms: (self.sum_sq.max(0.0) / self.window.len() as f64).sqrt() as f32,
            peak: self
                .window
                .iter()
                .fold(0.0, |m: analyzer::SignalStrength, s| m.max(s.abs())),
        }
    }
}

pub struct AudioFeatureSampler {
    buffer: analyzer::SampleBuffer,
    cursor: u64,
    scratch: Vec<[analyzer::Sample; 2]>,

    lowpass: biquad::DirectForm2Transposed<f32>,
    highpass: biquad::DirectForm2Transposed<f32>,

    full: Path,
    low: Path,
    high: Path,
}

impl std::fmt::Debug for AudioFeatureSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "AudioFeatureSampler {{ rate: {:?}, window: {:?}, cursor: {:?} }}",
            self.buffer.rate(),
            self.full.capacity,
            self.cursor,
        )
    }
}

impl AudioFeatureSampler {
    fn new(
        buffer: analyzer::SampleBuffer,
        window: usize,
        low_cutoff: f32,
        high_cutoff: f32,
    ) -> Result<AudioFeatureSampler> {
        let rate = buffer.rate();
        let window = window.max(1);

        let lowpass = filter(biquad::Type::LowPass, rate, low_cutoff)?;
        let highpass = filter(biquad::Type::HighPass, rate, high_cutoff)?;

        log::debug!("AudioFeatureSampler:");
        log::debug!("    Sample Rate = {:8}", rate);
        log::debug!("    Window      = {:8}", window);
        log::debug!("    Low Cutoff  = {:8.1} Hz", low_cutoff);
        log::debug!("    High Cutoff = {:8.1} Hz", high_cutoff);

        Ok(AudioFeatureSampler {
            buffer,
            cursor: 0,
            scratch: Vec::with_capacity(window),

            lowpass,
            highpass,

            full: Path::new(window),
            low: Path::new(window),
            high: Path::new(window),
        })
    }

    /// Fold in all new samples and report the current levels
    pub fn sample(&mut self) -> AudioFeatures {
        self.scratch.clear();
        self.buffer.read_since(&mut self.cursor, &mut self.scratch);
        log::trace!("AudioFeatureSampler: {} new samples", self.scratch.len());

        for [l, r] in self.scratch.iter() {
            let s = (l + r) / 2.0;
            self.full.push(s);
            self.low.push(self.lowpass.run(s));
            self.high.push(self.highpass.run(s));
        }

        self.features()
    }

    /// Levels as of the last call to [`sample`](Self::sample)
    pub fn features(&self) -> AudioFeatures {
        AudioFeatures {
            full: self.full.levels(),
            low: self.low.levels(),
            high: self.high.levels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: usize, n: usize) -> Vec<analyzer::Sample> {
        (0..n)
            .map(|i| (i as f32 / rate as f32 * freq * 2.0 * std::f32::consts::PI).sin())
            .collect()
    }

    fn sampler(buf: &analyzer::SampleBuffer) -> AudioFeatureSampler {
        FeatureBuilder::new()
            .window(1024)
            .low_cutoff(200.0)
            .high_cutoff(3000.0)
            .build(buf.clone())
            .unwrap()
    }

    #[test]
    fn test_silence() {
        let buf = analyzer::SampleBuffer::new(8000, 8000);
        let mut features = sampler(&buf);
        assert_eq!(features.sample(), AudioFeatures::default());
    }

    #[test]
    fn test_bass_goes_low() {
        let buf = analyzer::SampleBuffer::new(8000, 8000);
        let mut features = sampler(&buf);

        buf.push_mono(&sine(50.0, 8000, 4000));
        let f = features.sample();

        assert!((f.full.rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.05);
        assert!(f.full.peak > 0.95);
        assert!(f.low.rms > 0.5, "{:?}", f);
        assert!(f.high.rms < 0.05, "{:?}", f);
    }

    #[test]
    fn test_treble_goes_high() {
        let buf = analyzer::SampleBuffer::new(8000, 8000);
        let mut features = sampler(&buf);

        buf.push_mono(&sine(3800.0, 8000, 4000));
        let f = features.sample();

        assert!(f.high.rms > 0.5, "{:?}", f);
        assert!(f.low.rms < 0.05, "{:?}", f);
    }

    #[test]
    fn test_bad_cutoff() {
        let buf = analyzer::SampleBuffer::new(16, 8000);
        assert!(matches!(
            FeatureBuilder::new()
                .window(16)
                .low_cutoff(200.0)
                .high_cutoff(5000.0)
                .build(buf),
            Err(Error::Filter(_))
        ));
    }
}
