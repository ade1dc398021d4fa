//! Beat clocks
//!
//! A [`BeatSource`] maps wall-clock instants onto a continuous beat position.  The
//! integer part is the beat number, the fractional part the progress towards the next
//! beat.  Two implementations exist:
//!
//! * [`ManualBeatSource`]: tap tempo
//! * [`LinkBeatSource`]: follows a beat-sync server over the network
pub mod connection;
pub mod link;
pub mod manual;

pub use self::connection::{Action, Connection, ConnectionState};
pub use self::link::{parse_status, LinkBeatSource, LinkBuilder, LinkStatus};
pub use self::manual::{ManualBeatSource, ManualBuilder};

use std::time;

pub trait BeatSource: std::fmt::Debug {
    /// Beats per second
    fn hz(&self) -> f64;

    /// Continuous beat position at `at`
    fn beat_time(&self, at: time::Instant) -> f64;

    fn beat_number(&self, at: time::Instant) -> i64 {
        self.beat_time(at).floor() as i64
    }

    /// Fraction of the current beat that has passed, in `[0, 1)`
    fn progress_to_next_beat(&self, at: time::Instant) -> f64 {
        let t = self.beat_time(at);
        t - t.floor()
    }

    /// Seconds since the last beat boundary
    fn time_since_last_beat(&self, at: time::Instant) -> f64 {
        self.progress_to_next_beat(at) / self.hz()
    }

    /// Seconds until the next beat boundary
    fn time_until_next_beat(&self, at: time::Instant) -> f64 {
        (1.0 - self.progress_to_next_beat(at)) / self.hz()
    }

    /// Pick up asynchronous updates
    ///
    /// Called once per frame before rendering.
    fn poll(&mut self) {}
}
