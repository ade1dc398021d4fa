//! Destinations for composed frames
//!
//! Every frame's final color buffer is handed to each registered [`Sink`].  A sink
//! checks the rig once in [`attach`](Sink::attach), where any mismatch is fatal.
//! After that, failures in [`send`](Sink::send) are transient: the orchestrator logs
//! them and carries on with the next sink.
use crate::color::Color;
use crate::error::{Error, Result};
use crate::rig::{ColorBuffer, Rig};
use std::collections;

pub trait Sink {
    /// Validate the rig this sink will be fed with
    fn attach(&mut self, _rig: &Rig) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, leds: &ColorBuffer) -> Result<()>;
}

/// LED order per hardware channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLayout {
    /// For each channel, rig indices in hardware order
    channels: Vec<(u8, Vec<usize>)>,
    len: usize,
}

impl ChannelLayout {
    /// Every channel's LED indices must form a dense `0..n` run
    pub fn from_rig(rig: &Rig) -> Result<ChannelLayout> {
        let mut slots: collections::BTreeMap<u8, Vec<Option<usize>>> = Default::default();

        for (i, led) in rig.leds().iter().enumerate() {
            let slot = slots.entry(led.channel).or_default();
            let index = led.index as usize;
            if slot.len() <= index {
                slot.resize(index + 1, None);
            }
            if let Some(other) = slot[index] {
                return Err(Error::ChannelLayout {
                    channel: led.channel,
                    reason: format!("index {} used by LED {} and LED {}", index, other, i),
                });
            }
            slot[index] = Some(i);
        }

        let mut channels = Vec::with_capacity(slots.len());
        for (channel, slot) in slots {
            let leds = slot
                .iter()
                .enumerate()
                .map(|(index, led)| {
                    led.ok_or_else(|| Error::ChannelLayout {
                        channel,
                        reason: format!("index {} is missing", index),
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            channels.push((channel, leds));
        }

        Ok(ChannelLayout {
            channels,
            len: rig.len(),
        })
    }

    pub fn channels(&self) -> impl Iterator<Item = (u8, &[usize])> {
        self.channels.iter().map(|(c, leds)| (*c, &leds[..]))
    }

    /// Number of LEDs covered
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Raw output of one channel's colors, in hardware order
pub trait ChannelWriter {
    fn write(&mut self, channel: u8, colors: &[Color]) -> Result<()>;

    /// Called once all channels of a frame were written
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Splits frames by hardware channel and forwards them to a [`ChannelWriter`]
#[derive(Debug)]
pub struct ChannelSink<W: ChannelWriter> {
    writer: W,
    layout: Option<ChannelLayout>,
    scratch: Vec<Color>,
}

impl<W: ChannelWriter> ChannelSink<W> {
    pub fn new(writer: W) -> ChannelSink<W> {
        ChannelSink {
            writer,
            layout: None,
            scratch: Vec::new(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn layout(&self) -> Option<&ChannelLayout> {
        self.layout.as_ref()
    }
}

impl<W: ChannelWriter> Sink for ChannelSink<W> {
    fn attach(&mut self, rig: &Rig) -> Result<()> {
        let layout = ChannelLayout::from_rig(rig)?;
        log::debug!(
            "ChannelSink: {} LEDs on {} channels",
            layout.len(),
            layout.channels.len()
        );
        self.layout = Some(layout);
        Ok(())
    }

    fn send(&mut self, leds: &ColorBuffer) -> Result<()> {
        let layout = self.layout.as_ref().ok_or(Error::NotConfigured)?;
        if leds.len() != layout.len() {
            return Err(Error::LengthMismatch {
                expected: layout.len(),
                actual: leds.len(),
            });
        }

        for (channel, order) in layout.channels() {
            self.scratch.clear();
            self.scratch
                .extend(order.iter().map(|i| leds.get(*i).unwrap_or(Color::BLACK)));
            self.writer.write(channel, &self.scratch)?;
        }
        self.writer.flush()
    }
}
