//! Beat-aware signals derived from audio levels
//!
//! The [`SignalAnalyzer`] combines the band levels of an
//! [`AudioFeatureSampler`](super::AudioFeatureSampler) with a
//! [`BeatSource`](crate::beat::BeatSource) and turns them into a handful of named
//! signals visualizations can react to:
//!
//! * `new_beat`: the beat clock's integer beat number changed since the last frame
//! * `strong_beat`: the first low-band transient that lands close to a beat boundary
//! * `drop`: a very strong, beat-aligned low-band transient
//! * `dance`: more than half of the recent beats came with a low-band transient
//! * `low` / `high`: band envelopes, instant attack and adaptive exponential decay
use crate::analyzer::{AudioFeatureSampler, AudioFeatures, EmaTracker, SignalStrength};
use crate::beat::BeatSource;
use std::{collections, time};

/// Derived signals of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signals {
    pub new_beat: bool,
    pub strong_beat: bool,
    pub drop: bool,
    pub dance: bool,
    pub low: SignalStrength,
    pub high: SignalStrength,
}

#[derive(Debug, Default)]
pub struct SignalBuilder {
    /// Low band z-score at which a beat-aligned transient counts as a drop
    ///
    /// Can also be set from config as `"signals.drop_z"`.
    pub drop_z: Option<f32>,

    /// Low band z-score at which a beat-aligned transient qualifies a beat
    ///
    /// Can also be set from config as `"signals.transient_z"`.
    pub transient_z: Option<f32>,

    /// Distance to the closest beat boundary, as a fraction of a beat, inside
    /// which a transient counts as beat-aligned
    ///
    /// Can also be set from config as `"signals.beat_tolerance"`.
    pub beat_tolerance: Option<f64>,

    /// Number of beats remembered for the dance signal
    ///
    /// Can also be set from config as `"signals.history"`.
    pub history: Option<usize>,

    /// Envelope half-life while a drop or dance is going on, in seconds
    ///
    /// Can also be set from config as `"signals.min_half_life"`.
    pub min_half_life: Option<f32>,

    /// Relaxed envelope half-life, in seconds
    ///
    /// Can also be set from config as `"signals.max_half_life"`.
    pub max_half_life: Option<f32>,
}

impl SignalBuilder {
    pub fn new() -> SignalBuilder {
        Default::default()
    }

    pub fn drop_z(&mut self, z: f32) -> &mut SignalBuilder {
        self.drop_z = Some(z);
        self
    }

    pub fn transient_z(&mut self, z: f32) -> &mut SignalBuilder {
        self.transient_z = Some(z);
        self
    }

    pub fn beat_tolerance(&mut self, tolerance: f64) -> &mut SignalBuilder {
        self.beat_tolerance = Some(tolerance);
        self
    }

    pub fn history(&mut self, beats: usize) -> &mut SignalBuilder {
        self.history = Some(beats);
        self
    }

    pub fn half_life(&mut self, min: f32, max: f32) -> &mut SignalBuilder {
        self.min_half_life = Some(min);
        self.max_half_life = Some(max);
        self
    }

    pub fn build(&mut self, sampler: Option<AudioFeatureSampler>) -> SignalAnalyzer {
        SignalAnalyzer::from_builder(self, sampler)
    }
}

/// Ring of "did this beat come with a transient" flags
#[derive(Debug, Clone)]
struct BeatHistory {
    hits: collections::VecDeque<bool>,
    capacity: usize,
}

impl BeatHistory {
    fn new(capacity: usize) -> BeatHistory {
        BeatHistory {
            hits: collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, hit: bool) {
        if self.hits.len() == self.capacity {
            self.hits.pop_front();
        }
        self.hits.push_back(hit);
    }

    fn majority(&self) -> bool {
        let count = self.hits.iter().filter(|h| **h).count();
        count * 2 > self.capacity
    }
}

/// Window around one beat boundary
#[derive(Debug, Clone, Copy)]
struct BeatWindow {
    beat: i64,
    hit: bool,
}

#[derive(Debug, Clone)]
struct Envelope {
    level: SignalStrength,
    half_life: f32,
}

impl Envelope {
    fn new(half_life: f32) -> Envelope {
        Envelope {
            level: 0.0,
            half_life,
        }
    }

    fn update(&mut self, value: SignalStrength, dt: f32) -> SignalStrength {
        if value > self.level {
            self.level = value;
        } else {
            self.level *= 0.5f32.powf(dt / self.half_life.max(1e-3));
        }
        self.level
    }
}

/// Half-life of the half-life adaption itself
const ADAPT_HALF_LIFE: f32 = 1.0;

#[derive(Debug)]
pub struct SignalAnalyzer {
    sampler: Option<AudioFeatureSampler>,

    drop_z: f32,
    transient_z: f32,
    beat_tolerance: f64,
    min_half_life: f32,
    max_half_life: f32,

    low_z: EmaTracker,
    low: Envelope,
    high: Envelope,
    half_life: f32,

    last_beat: Option<i64>,
    window: Option<BeatWindow>,
    history: BeatHistory,

    signals: Signals,
}

impl SignalAnalyzer {
    pub fn from_builder(
        build: &SignalBuilder,
        sampler: Option<AudioFeatureSampler>,
    ) -> SignalAnalyzer {
        let drop_z = build
            .drop_z
            .unwrap_or_else(|| crate::CONFIG.get_or("signals.drop_z", 3.0));
        let transient_z = build
            .transient_z
            .unwrap_or_else(|| crate::CONFIG.get_or("signals.transient_z", 1.5));
        let beat_tolerance = build
            .beat_tolerance
            .unwrap_or_else(|| crate::CONFIG.get_or("signals.beat_tolerance", 0.15));
        let history = build
            .history
            .unwrap_or_else(|| crate::CONFIG.get_or("signals.history", 8));
        let min_half_life = build
            .min_half_life
            .unwrap_or_else(|| crate::CONFIG.get_or("signals.min_half_life", 0.08));
        let max_half_life = build
            .max_half_life
            .unwrap_or_else(|| crate::CONFIG.get_or("signals.max_half_life", 0.6));

        log::debug!("SignalAnalyzer:");
        log::debug!("    Drop Z         = {:6.2}", drop_z);
        log::debug!("    Transient Z    = {:6.2}", transient_z);
        log::debug!("    Beat Tolerance = {:6.2}", beat_tolerance);
        log::debug!("    History        = {:6}", history);
        log::debug!(
            "    Half-Life      = {:.3}s .. {:.3}s",
            min_half_life,
            max_half_life
        );

        SignalAnalyzer {
            sampler,

            drop_z,
            transient_z,
            beat_tolerance,
            min_half_life,
            max_half_life,

            low_z: EmaTracker::with_window(3),
            low: Envelope::new(max_half_life),
            high: Envelope::new(max_half_life),
            half_life: max_half_life,

            last_beat: None,
            window: None,
            history: BeatHistory::new(history.max(1)),

            signals: Signals::default(),
        }
    }

    /// Sample the audio tap and update all signals
    ///
    /// Without an audio tap this behaves as if the input was silent.
    pub fn update(
        &mut self,
        beat: &dyn BeatSource,
        now: time::Instant,
        dt: f32,
    ) -> Signals {
        let features = match self.sampler {
            Some(ref mut s) => s.sample(),
            None => AudioFeatures::default(),
        };
        self.process(&features, beat, now, dt)
    }

    /// Update all signals from externally sampled levels
    pub fn process(
        &mut self,
        features: &AudioFeatures,
        beat: &dyn BeatSource,
        now: time::Instant,
        dt: f32,
    ) -> Signals {
        let mut signals = Signals::default();

        // New beat
        let number = beat.beat_number(now);
        signals.new_beat = matches!(self.last_beat, Some(last) if last != number);
        self.last_beat = Some(number);

        // Beat alignment
        let position = beat.beat_time(now);
        let nearest = position.round();
        let near_beat = (position - nearest).abs() <= self.beat_tolerance;

        // Low band transients
        let z = self.low_z.update(features.low.rms);
        let transient = z > self.transient_z;
        signals.drop = near_beat && z > self.drop_z;

        if near_beat {
            let nearest = nearest as i64;
            if self.window.map(|w| w.beat) != Some(nearest) {
                self.close_window();
                self.window = Some(BeatWindow {
                    beat: nearest,
                    hit: false,
                });
            }
            if let Some(ref mut w) = self.window {
                if transient && !w.hit {
                    w.hit = true;
                    signals.strong_beat = true;
                }
            }
        } else {
            self.close_window();
        }

        signals.dance = self.history.majority();

        // Envelopes
        let target = if signals.drop || signals.dance {
            self.min_half_life
        } else {
            self.max_half_life
        };
        let adapt = 1.0 - 0.5f32.powf(dt.max(0.0) / ADAPT_HALF_LIFE);
        self.half_life += (target - self.half_life) * adapt;
        if signals.drop {
            self.half_life = self.min_half_life;
        }
        self.low.half_life = self.half_life;
        self.high.half_life = self.half_life;

        signals.low = self.low.update(features.low.rms, dt);
        signals.high = self.high.update(features.high.rms, dt);

        log::trace!("Signals: {:?} (z = {:.2})", signals, z);
        self.signals = signals;
        signals
    }

    fn close_window(&mut self) {
        if let Some(w) = self.window.take() {
            self.history.push(w.hit);
        }
    }

    /// Signals of the last update
    pub fn signals(&self) -> Signals {
        self.signals
    }

    /// Current envelope half-life in seconds
    pub fn half_life(&self) -> f32 {
        self.half_life
    }
}
