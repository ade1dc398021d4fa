//! Physical LED arrangements and their color buffers
use crate::color::Color;
use crate::error::{Error, Result};

pub type Point = nalgebra::Point3<f32>;

/// One physically addressed LED
#[derive(Debug, Clone, PartialEq)]
pub struct LedDescriptor {
    pub position: Point,
    /// Hardware output channel
    pub channel: u8,
    /// Position within the hardware channel
    pub index: u16,
    /// Coarse row grouping for 2D layouts
    pub row: Option<u16>,
}

impl LedDescriptor {
    pub fn new(position: Point, channel: u8, index: u16) -> LedDescriptor {
        LedDescriptor {
            position,
            channel,
            index,
            row: None,
        }
    }

    pub fn with_row(mut self, row: u16) -> LedDescriptor {
        self.row = Some(row);
        self
    }
}

/// The fixed LED arrangement of one installation
///
/// A rig is never mutated once constructed.  Only the parallel [`ColorBuffer`]
/// changes from frame to frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Rig {
    id: String,
    leds: Vec<LedDescriptor>,
}

impl Rig {
    pub fn new<S: Into<String>>(id: S, leds: Vec<LedDescriptor>) -> Rig {
        Rig {
            id: id.into(),
            leds,
        }
    }

    /// A straight line of LEDs along the x axis, all on channel 0 and row 0
    pub fn line<S: Into<String>>(id: S, count: usize, spacing: f32) -> Rig {
        let leds = (0..count)
            .map(|i| {
                LedDescriptor::new(Point::new(i as f32 * spacing, 0.0, 0.0), 0, i as u16)
                    .with_row(0)
            })
            .collect();
        Rig::new(id, leds)
    }

    /// A `cols` x `rows` grid in the z = 0 plane
    ///
    /// Every row is wired to its own hardware channel.
    pub fn grid<S: Into<String>>(id: S, cols: usize, rows: usize, spacing: f32) -> Rig {
        let mut leds = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                leds.push(
                    LedDescriptor::new(
                        Point::new(col as f32 * spacing, row as f32 * spacing, 0.0),
                        row as u8,
                        col as u16,
                    )
                    .with_row(row as u16),
                );
            }
        }
        Rig::new(id, leds)
    }

    /// Identity used for caching derived data
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn leds(&self) -> &[LedDescriptor] {
        &self.leds
    }

    pub fn len(&self) -> usize {
        self.leds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    /// Create a black color buffer matching this rig
    pub fn buffer(&self) -> ColorBuffer {
        ColorBuffer::new(self.len())
    }
}

/// Per-LED colors, in the same order as the rig's descriptors
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBuffer {
    colors: Vec<Color>,
}

impl ColorBuffer {
    pub fn new(len: usize) -> ColorBuffer {
        ColorBuffer {
            colors: vec![Color::BLACK; len],
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<Color> {
        self.colors.get(i).copied()
    }

    /// Set one LED.  Writes past the end are ignored.
    pub fn set(&mut self, i: usize, color: Color) {
        if let Some(c) = self.colors.get_mut(i) {
            *c = color;
        }
    }

    /// Add onto one LED, saturating.  Writes past the end are ignored.
    pub fn add(&mut self, i: usize, color: Color) {
        if let Some(c) = self.colors.get_mut(i) {
            *c += color;
        }
    }

    pub fn fill(&mut self, color: Color) {
        for c in self.colors.iter_mut() {
            *c = color;
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Color> {
        self.colors.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Color> {
        self.colors.iter_mut()
    }

    pub fn as_slice(&self) -> &[Color] {
        &self.colors
    }

    /// Copy all colors from a buffer of the same length
    pub fn copy_from(&mut self, other: &ColorBuffer) -> Result<()> {
        if other.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        self.colors.copy_from_slice(&other.colors);
        Ok(())
    }
}
