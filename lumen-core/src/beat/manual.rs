//! Tap tempo
use crate::helpers;
use std::time;

#[derive(Debug, Default)]
pub struct ManualBuilder {
    /// Slowest tempo a pair of taps is still considered part of one sequence
    ///
    /// Can also be set from config as `"beat.min_bpm"`.
    pub min_bpm: Option<f64>,

    /// Tempo before the first tap sequence
    ///
    /// Can also be set from config as `"beat.default_bpm"`.
    pub bpm: Option<f64>,
}

impl ManualBuilder {
    pub fn new() -> ManualBuilder {
        Default::default()
    }

    pub fn min_bpm(&mut self, bpm: f64) -> &mut ManualBuilder {
        self.min_bpm = Some(bpm);
        self
    }

    pub fn bpm(&mut self, bpm: f64) -> &mut ManualBuilder {
        self.bpm = Some(bpm);
        self
    }

    pub fn build(&mut self, start: time::Instant) -> ManualBeatSource {
        let min_bpm = self
            .min_bpm
            .unwrap_or_else(|| crate::CONFIG.get_or("beat.min_bpm", 40.0));
        let bpm = self
            .bpm
            .unwrap_or_else(|| crate::CONFIG.get_or("beat.default_bpm", 120.0));

        log::debug!("ManualBeatSource:");
        log::debug!("    Initial BPM = {:6.1}", bpm);
        log::debug!("    Min BPM     = {:6.1}", min_bpm);

        ManualBeatSource::with_bpm(bpm, min_bpm, start)
    }
}

/// Beat clock driven by tapping along
///
/// Each tap closer than `60 / min_bpm` seconds to the previous one continues the
/// current sequence: the beat length becomes the latest gap and the sequence start
/// is moved so the latest tap lands exactly on a beat.  A slower tap starts a new
/// sequence on the spot, keeping the previous tempo.
#[derive(Debug, Clone)]
pub struct ManualBeatSource {
    beat_len: f64,
    max_gap: f64,

    /// Most recent tap, or the clock origin before any tap
    anchor: time::Instant,
    /// Beat position of `anchor`
    anchor_beat: f64,
    last_tap: Option<time::Instant>,
    taps: u32,
}

impl ManualBeatSource {
    pub fn new(start: time::Instant) -> ManualBeatSource {
        ManualBuilder::new().build(start)
    }

    pub fn with_bpm(bpm: f64, min_bpm: f64, start: time::Instant) -> ManualBeatSource {
        let bpm = if bpm > 0.0 { bpm } else { 120.0 };
        let min_bpm = if min_bpm > 0.0 { min_bpm } else { 40.0 };

        ManualBeatSource {
            beat_len: 60.0 / bpm,
            max_gap: 60.0 / min_bpm,

            anchor: start,
            anchor_beat: 0.0,
            last_tap: None,
            taps: 0,
        }
    }

    pub fn tap(&mut self, at: time::Instant) {
        let gap = self.last_tap.map(|last| helpers::seconds_between(last, at));

        match gap {
            Some(gap) if gap > 0.0 && gap < self.max_gap => {
                self.taps += 1;
                self.beat_len = gap;
                log::debug!(
                    "Tap {} in sequence, {:.1} BPM",
                    self.taps,
                    60.0 / self.beat_len
                );
            }
            _ => {
                self.taps = 1;
                log::debug!("New tap sequence");
            }
        }

        self.anchor = at;
        self.anchor_beat = f64::from(self.taps - 1);
        self.last_tap = Some(at);
    }

    /// Number of taps in the current sequence
    pub fn taps(&self) -> u32 {
        self.taps
    }

    pub fn bpm(&self) -> f64 {
        60.0 / self.beat_len
    }
}

impl super::BeatSource for ManualBeatSource {
    fn hz(&self) -> f64 {
        1.0 / self.beat_len
    }

    fn beat_time(&self, at: time::Instant) -> f64 {
        self.anchor_beat + helpers::seconds_between(self.anchor, at) / self.beat_len
    }
}
