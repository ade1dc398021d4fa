//! Audio capture
//!
//! A recorder owns a [`SampleBuffer`](analyzer::SampleBuffer) and keeps it filled from
//! some audio source.  Which recorder is used is a matter of configuration:
//!
//! * `"none"`: nothing records, the caller pushes samples itself
//! * `"cpal"`: the default input device (needs the `cpalrecord` feature)
#[cfg(feature = "cpalrecord")]
pub mod cpal;

use crate::analyzer;
use crate::error::{Error, Result};

pub trait Recorder: std::fmt::Debug {
    /// Return the sample buffer where this recorder pushes data into
    fn sample_buffer(&self) -> &analyzer::SampleBuffer;
}

/// A recorder that never records anything on its own
#[derive(Debug)]
pub struct ManualRecorder {
    buffer: analyzer::SampleBuffer,
}

impl ManualRecorder {
    pub fn new(buffer_size: usize, rate: usize) -> ManualRecorder {
        ManualRecorder {
            buffer: analyzer::SampleBuffer::new(buffer_size, rate),
        }
    }
}

impl Recorder for ManualRecorder {
    fn sample_buffer(&self) -> &analyzer::SampleBuffer {
        &self.buffer
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecorderBuilder {
    pub rate: Option<usize>,
    pub buffer_size: Option<usize>,
    pub recorder: Option<String>,
}

impl RecorderBuilder {
    pub fn new() -> RecorderBuilder {
        Default::default()
    }

    pub fn rate(&mut self, rate: usize) -> &mut RecorderBuilder {
        self.rate = Some(rate);
        self
    }

    pub fn buffer_size(&mut self, buffer_size: usize) -> &mut RecorderBuilder {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn recorder<S: Into<String>>(&mut self, rec: S) -> &mut RecorderBuilder {
        self.recorder = Some(rec.into());
        self
    }

    pub fn build(&mut self) -> Result<Box<dyn Recorder>> {
        let rate = self
            .rate
            .unwrap_or_else(|| crate::CONFIG.get_or("audio.rate", 44100));
        let buffer_size = self
            .buffer_size
            .unwrap_or_else(|| crate::CONFIG.get_or("audio.buffer", 44100));
        let recorder = self
            .recorder
            .clone()
            .unwrap_or_else(|| crate::CONFIG.get_or("audio.recorder", "none".to_string()));

        log::debug!("Recorder:");
        log::debug!("    Type        = {:?}", recorder);
        log::debug!("    Rate        = {:8}", rate);
        log::debug!("    Buffer Size = {:8}", buffer_size);

        match &*recorder {
            "none" => Ok(Box::new(ManualRecorder::new(buffer_size, rate))),

            #[cfg(feature = "cpalrecord")]
            "cpal" => Ok(Box::new(self::cpal::CPalRecorder::new(rate, buffer_size)?)),

            _ => Err(Error::UnknownRecorder(recorder)),
        }
    }
}
