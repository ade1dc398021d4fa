//! Dials and buttons handed out to visualizations on demand
//!
//! A [`ControlBank`] holds the raw state of the physical controller (normalized dial
//! positions, button states and this frame's button transitions).  Visualizations
//! never address the bank directly: they ask the session's [`ControlAllocator`] for a
//! [`Dial`] or [`Button`] handle, either by number or by taking the lowest free one.
//!
//! # Example
//! ```
//! # use lumen_core::controls::*;
//! let bank = ControlBank::shared();
//! let mut controls = ControlAllocator::new(bank.clone());
//!
//! let speed = controls
//!     .create_dial(DialBuilder::new().range(0.5, 4.0).initial(1.0))
//!     .unwrap();
//! assert_eq!(speed.number(), 1);
//! assert!((speed.value() - 1.0).abs() < 1e-6);
//!
//! speed.set_value(100.0).unwrap();
//! assert_eq!(speed.value(), 4.0);
//! ```
use crate::error::{ControlKind, Error, Result};
use std::{cell, collections, rc};

/// Number of physical dials
pub const DIALS: u8 = 9;
/// Number of physical buttons
pub const BUTTONS: u8 = 8;
/// Highest dial number handed out automatically
pub const DIAL_POOL: u8 = 7;
/// Highest button number handed out automatically
pub const BUTTON_POOL: u8 = 8;

/// Reserved dial controlling the stochastic per-LED update skip
pub const DEREZ_DIAL: u8 = 8;
/// Reserved dial controlling global brightness
pub const BRIGHTNESS_DIAL: u8 = 9;

/// Brightness never survives a reset below this
pub const MIN_KEPT_BRIGHTNESS: f32 = 0.05;
/// Derez never survives a reset above this
pub const MAX_KEPT_DEREZ: f32 = 0.95;

pub type SharedBank = rc::Rc<cell::RefCell<ControlBank>>;

/// Raw controller state
#[derive(Debug, Clone)]
pub struct ControlBank {
    generation: u64,
    dials: [f32; DIALS as usize],
    buttons: [bool; BUTTONS as usize],
    transitions: Vec<(u8, bool)>,
}

impl Default for ControlBank {
    fn default() -> ControlBank {
        let mut bank = ControlBank {
            generation: 0,
            dials: [0.0; DIALS as usize],
            buttons: [false; BUTTONS as usize],
            transitions: Vec::new(),
        };
        bank.dials[BRIGHTNESS_DIAL as usize - 1] = 1.0;
        bank
    }
}

impl ControlBank {
    pub fn new() -> ControlBank {
        Default::default()
    }

    pub fn shared() -> SharedBank {
        rc::Rc::new(cell::RefCell::new(ControlBank::new()))
    }

    /// Current session generation; handles from older generations are stale
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Normalized position of a dial, 0 for dials that do not exist
    pub fn dial(&self, number: u8) -> f32 {
        number
            .checked_sub(1)
            .and_then(|i| self.dials.get(i as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Move a dial, the position is bracketed into `[0, 1]`
    pub fn set_dial(&mut self, number: u8, position: f32) {
        let position = if position.is_nan() {
            0.0
        } else {
            position.max(0.0).min(1.0)
        };
        match number.checked_sub(1).and_then(|i| self.dials.get_mut(i as usize)) {
            Some(d) => *d = position,
            None => log::debug!("Ignoring unknown dial {}", number),
        }
    }

    pub fn button(&self, number: u8) -> bool {
        number
            .checked_sub(1)
            .and_then(|i| self.buttons.get(i as usize))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_button(&mut self, number: u8, pressed: bool) {
        match number
            .checked_sub(1)
            .and_then(|i| self.buttons.get_mut(i as usize))
        {
            Some(b) => {
                *b = pressed;
                self.transitions.push((number, pressed));
            }
            None => log::debug!("Ignoring unknown button {}", number),
        }
    }

    /// Button transitions recorded since the start of this frame
    pub fn transitions(&self) -> &[(u8, bool)] {
        &self.transitions
    }

    /// Clear the transition queue
    pub fn begin_frame(&mut self) {
        self.transitions.clear();
    }

    pub fn brightness(&self) -> f32 {
        self.dial(BRIGHTNESS_DIAL)
    }

    pub fn derez(&self) -> f32 {
        self.dial(DEREZ_DIAL)
    }

    /// Start a new session
    ///
    /// All controller state is dropped, except the brightness and derez settings
    /// which are kept (clamped away from black and from "never update").
    pub fn reset(&mut self) {
        let brightness = self.brightness().max(MIN_KEPT_BRIGHTNESS);
        let derez = self.derez().min(MAX_KEPT_DEREZ);

        self.generation += 1;
        self.dials = [0.0; DIALS as usize];
        self.buttons = [false; BUTTONS as usize];
        self.transitions.clear();

        self.set_dial(BRIGHTNESS_DIAL, brightness);
        self.set_dial(DEREZ_DIAL, derez);
    }
}

/// Options for a new dial
#[derive(Debug, Clone, Default)]
pub struct DialBuilder {
    /// Explicit dial number, lowest free one otherwise
    pub number: Option<u8>,
    /// Value range, `[0, 1]` by default
    pub range: Option<(f32, f32)>,
    /// Initial value, the dial's current position is kept otherwise
    pub initial: Option<f32>,
}

impl DialBuilder {
    pub fn new() -> DialBuilder {
        Default::default()
    }

    pub fn number(&mut self, number: u8) -> &mut DialBuilder {
        self.number = Some(number);
        self
    }

    pub fn range(&mut self, min: f32, max: f32) -> &mut DialBuilder {
        self.range = Some((min, max));
        self
    }

    pub fn initial(&mut self, value: f32) -> &mut DialBuilder {
        self.initial = Some(value);
        self
    }
}

/// Options for a new button
#[derive(Debug, Clone, Default)]
pub struct ButtonBuilder {
    pub number: Option<u8>,
}

impl ButtonBuilder {
    pub fn new() -> ButtonBuilder {
        Default::default()
    }

    pub fn number(&mut self, number: u8) -> &mut ButtonBuilder {
        self.number = Some(number);
        self
    }
}

/// Hands out control handles for one session
#[derive(Debug)]
pub struct ControlAllocator {
    bank: SharedBank,
    dials: collections::BTreeSet<u8>,
    buttons: collections::BTreeSet<u8>,
}

fn claim(
    taken: &mut collections::BTreeSet<u8>,
    kind: ControlKind,
    requested: Option<u8>,
    physical: u8,
    pool: u8,
) -> Result<u8> {
    let number = match requested {
        Some(n) if n == 0 || n > physical => {
            return Err(Error::HandleOutOfRange { kind, number: n })
        }
        Some(n) => n,
        None => (1..=pool)
            .find(|n| !taken.contains(n))
            .ok_or(Error::PoolExhausted(kind))?,
    };

    if !taken.insert(number) {
        return Err(Error::HandleTaken { kind, number });
    }
    Ok(number)
}

impl ControlAllocator {
    pub fn new(bank: SharedBank) -> ControlAllocator {
        ControlAllocator {
            bank,
            dials: collections::BTreeSet::new(),
            buttons: collections::BTreeSet::new(),
        }
    }

    pub fn bank(&self) -> &SharedBank {
        &self.bank
    }

    pub fn create_dial(&mut self, builder: &DialBuilder) -> Result<Dial> {
        let (min, max) = builder.range.unwrap_or((0.0, 1.0));
        if !(min < max) || !min.is_finite() || !max.is_finite() {
            return Err(Error::InvalidRange { min, max });
        }

        let number = claim(
            &mut self.dials,
            ControlKind::Dial,
            builder.number,
            DIALS,
            DIAL_POOL,
        )?;

        let dial = Dial {
            number,
            min,
            max,
            generation: self.bank.borrow().generation(),
            bank: self.bank.clone(),
        };
        if let Some(initial) = builder.initial {
            dial.set_value(initial)?;
        }

        log::debug!("Allocated dial {} [{}, {}]", number, min, max);
        Ok(dial)
    }

    pub fn create_button(&mut self, builder: &ButtonBuilder) -> Result<Button> {
        let number = claim(
            &mut self.buttons,
            ControlKind::Button,
            builder.number,
            BUTTONS,
            BUTTON_POOL,
        )?;

        log::debug!("Allocated button {}", number);
        Ok(Button {
            number,
            generation: self.bank.borrow().generation(),
            bank: self.bank.clone(),
        })
    }

    /// Release every handle of this allocator
    pub fn reset(&mut self) {
        self.dials.clear();
        self.buttons.clear();
    }
}

/// A dial mapped onto a caller-chosen range
#[derive(Debug, Clone)]
pub struct Dial {
    number: u8,
    min: f32,
    max: f32,
    generation: u64,
    bank: SharedBank,
}

impl Dial {
    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Normalized position in `[0, 1]`
    pub fn position(&self) -> f32 {
        self.bank.borrow().dial(self.number)
    }

    pub fn value(&self) -> f32 {
        self.min + self.position() * (self.max - self.min)
    }

    /// Set the dial, values outside the range are bracketed
    pub fn set_value(&self, value: f32) -> Result<()> {
        let mut bank = self.bank.borrow_mut();
        if bank.generation() != self.generation {
            return Err(Error::StaleHandle);
        }
        if self.number == BRIGHTNESS_DIAL || self.number == DEREZ_DIAL {
            log::warn!("Overwriting reserved dial {}", self.number);
        }
        bank.set_dial(self.number, (value - self.min) / (self.max - self.min));
        Ok(())
    }
}

/// A push button with edge detection
#[derive(Debug, Clone)]
pub struct Button {
    number: u8,
    generation: u64,
    bank: SharedBank,
}

impl Button {
    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn is_pressed(&self) -> bool {
        self.bank.borrow().button(self.number)
    }

    /// Whether the button went down since the last frame
    pub fn pressed(&self) -> bool {
        self.bank
            .borrow()
            .transitions()
            .iter()
            .any(|&(n, p)| n == self.number && p)
    }

    /// Whether the button came up since the last frame
    pub fn released(&self) -> bool {
        self.bank
            .borrow()
            .transitions()
            .iter()
            .any(|&(n, p)| n == self.number && !p)
    }

    /// Whether this handle was created in the bank's current session
    pub fn is_current(&self) -> bool {
        self.bank.borrow().generation() == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free() {
        let bank = ControlBank::shared();
        let mut controls = ControlAllocator::new(bank);

        let a = controls.create_dial(&DialBuilder::new()).unwrap();
        let b = controls
            .create_dial(DialBuilder::new().number(3))
            .unwrap();
        let c = controls.create_dial(&DialBuilder::new()).unwrap();
        let d = controls.create_dial(&DialBuilder::new()).unwrap();
        assert_eq!(
            [a.number(), b.number(), c.number(), d.number()],
            [1, 3, 2, 4]
        );
    }

    #[test]
    fn test_taken_and_exhausted() {
        let bank = ControlBank::shared();
        let mut controls = ControlAllocator::new(bank);

        for _ in 0..DIAL_POOL {
            controls.create_dial(&DialBuilder::new()).unwrap();
        }
        assert!(matches!(
            controls.create_dial(&DialBuilder::new()),
            Err(Error::PoolExhausted(ControlKind::Dial))
        ));
        assert!(matches!(
            controls.create_dial(DialBuilder::new().number(2)),
            Err(Error::HandleTaken {
                kind: ControlKind::Dial,
                number: 2
            })
        ));
        assert!(matches!(
            controls.create_dial(DialBuilder::new().number(10)),
            Err(Error::HandleOutOfRange { .. })
        ));
        assert!(matches!(
            controls.create_button(ButtonBuilder::new().number(0)),
            Err(Error::HandleOutOfRange { .. })
        ));

        // Reserved dials can still be requested explicitly
        let brightness = controls
            .create_dial(DialBuilder::new().number(BRIGHTNESS_DIAL))
            .unwrap();
        assert_eq!(brightness.value(), 1.0);
    }

    #[test]
    fn test_invalid_range() {
        let mut controls = ControlAllocator::new(ControlBank::shared());
        assert!(matches!(
            controls.create_dial(DialBuilder::new().range(1.0, 1.0)),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            controls.create_dial(DialBuilder::new().range(2.0, -1.0)),
            Err(Error::InvalidRange { .. })
        ));
        // A failed request must not leak the handle
        assert_eq!(
            controls.create_dial(&DialBuilder::new()).unwrap().number(),
            1
        );
    }

    #[test]
    fn test_dial_mapping() {
        let bank = ControlBank::shared();
        let mut controls = ControlAllocator::new(bank.clone());
        let dial = controls
            .create_dial(DialBuilder::new().range(-10.0, 10.0))
            .unwrap();

        bank.borrow_mut().set_dial(dial.number(), 0.75);
        assert!((dial.value() - 5.0).abs() < 1e-5);

        dial.set_value(-50.0).unwrap();
        assert_eq!(dial.value(), -10.0);
        assert_eq!(dial.position(), 0.0);

        dial.set_value(0.0).unwrap();
        assert!((dial.position() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_button_edges() {
        let bank = ControlBank::shared();
        let mut controls = ControlAllocator::new(bank.clone());
        let button = controls.create_button(&ButtonBuilder::new()).unwrap();

        bank.borrow_mut().set_button(1, true);
        assert!(button.is_pressed());
        assert!(button.pressed());
        assert!(!button.released());

        bank.borrow_mut().begin_frame();
        assert!(button.is_pressed());
        assert!(!button.pressed());

        bank.borrow_mut().set_button(1, false);
        bank.borrow_mut().set_button(1, true);
        assert!(button.pressed());
        assert!(button.released());
        assert!(button.is_pressed());
    }

    #[test]
    fn test_reset() {
        let bank = ControlBank::shared();
        let mut controls = ControlAllocator::new(bank.clone());
        let dial = controls.create_dial(&DialBuilder::new()).unwrap();
        let button = controls.create_button(&ButtonBuilder::new()).unwrap();

        bank.borrow_mut().set_dial(BRIGHTNESS_DIAL, 0.0);
        bank.borrow_mut().set_dial(DEREZ_DIAL, 1.0);
        bank.borrow_mut().set_dial(1, 0.3);
        bank.borrow_mut().set_button(1, true);

        bank.borrow_mut().reset();
        controls.reset();

        assert_eq!(bank.borrow().brightness(), MIN_KEPT_BRIGHTNESS);
        assert_eq!(bank.borrow().derez(), MAX_KEPT_DEREZ);
        assert_eq!(bank.borrow().dial(1), 0.0);
        assert!(!bank.borrow().button(1));
        assert!(bank.borrow().transitions().is_empty());

        assert!(matches!(dial.set_value(0.5), Err(Error::StaleHandle)));
        assert!(!button.is_current());
        assert_eq!(
            controls.create_dial(&DialBuilder::new()).unwrap().number(),
            1
        );
    }
}
