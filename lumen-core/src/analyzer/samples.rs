//! Sample Buffer
use std::collections;
use std::sync;

pub type Sample = f32;

#[derive(Debug)]
struct Inner {
    samples: collections::VecDeque<[Sample; 2]>,
    /// Total number of samples ever pushed
    written: u64,
}

type _SampleBuf = sync::Arc<parking_lot::Mutex<Inner>>;

/// Shared ring buffer of stereo samples
///
/// The recorder pushes into it from its own thread, analyzers read from it
/// whenever they run.  Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    buf: _SampleBuf,
    rate: usize,
}

impl SampleBuffer {
    pub fn new(size: usize, rate: usize) -> SampleBuffer {
        let samples = collections::VecDeque::from(vec![[0.0; 2]; size]);

        SampleBuffer {
            buf: sync::Arc::new(parking_lot::Mutex::new(Inner {
                samples,
                written: 0,
            })),
            rate,
        }
    }

    pub fn rate(&self) -> usize {
        self.rate
    }

    pub fn len(&self) -> usize {
        self.buf.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, new: &[[Sample; 2]]) {
        let mut lock = self.buf.lock();

        #[cfg(debug_assertions)]
        let debug_size = lock.samples.len();

        if lock.samples.is_empty() {
            lock.written += new.len() as u64;
            return;
        }

        for sample in new.iter() {
            lock.samples.pop_front();
            lock.samples.push_back(*sample);
        }
        lock.written += new.len() as u64;

        #[cfg(debug_assertions)]
        assert_eq!(debug_size, lock.samples.len(), "Sample buffer size differs!");
    }

    /// Push mono samples, duplicated onto both channels
    pub fn push_mono(&self, new: &[Sample]) {
        let stereo: Vec<[Sample; 2]> = new.iter().map(|s| [*s, *s]).collect();
        self.push(&stereo);
    }

    /// Copy every sample pushed since `cursor` into `out`
    ///
    /// `cursor` is advanced to the current write position.  If more samples arrived
    /// than the buffer holds, only the retained ones are copied.
    pub fn read_since(&self, cursor: &mut u64, out: &mut Vec<[Sample; 2]>) {
        let lock = self.buf.lock();
        let fresh = lock.written.saturating_sub(*cursor);
        let available = (fresh as usize).min(lock.samples.len());

        let start = lock.samples.len() - available;
        out.extend(lock.samples.range(start..));
        *cursor = lock.written;
    }

    /// RMS volume over the last `length` seconds
    pub fn volume(&self, length: f32) -> super::SignalStrength {
        use super::SignalStrength;

        let lock = self.buf.lock();
        let len = lock.samples.len();
        let window = ((self.rate as f32 * length) as usize).max(1).min(len);
        if window == 0 {
            return 0.0;
        }

        (lock
            .samples
            .iter()
            .skip(len - window)
            // RMS
            .map(|s| ((s[0] + s[1]) / 2.0).powi(2) as SignalStrength)
            .sum::<SignalStrength>()
            / window as SignalStrength)
            .sqrt()
    }
}
