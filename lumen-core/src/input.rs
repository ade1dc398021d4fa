//! Piano and controller input
//!
//! Input collaborators (MIDI callbacks, network handlers, ...) push normalized
//! [`InputEvent`]s into an [`InputQueue`] from any thread.  The orchestrator drains
//! the queue once at the top of every frame, so events arriving between two frames
//! are coalesced into the next one.
use std::sync;

pub const KEYS: usize = 88;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown { key: u8, velocity: f32 },
    KeyUp { key: u8 },
    Dial { number: u8, value: f32 },
    Button { number: u8, pressed: bool },
}

#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    events: sync::Arc<parking_lot::Mutex<Vec<InputEvent>>>,
}

impl InputQueue {
    pub fn new() -> InputQueue {
        Default::default()
    }

    pub fn push(&self, event: InputEvent) {
        self.events.lock().push(event);
    }

    /// Take all events queued so far
    pub fn drain(&self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// State of all 88 keys
#[derive(Debug, Clone)]
pub struct PianoState {
    pressed: [bool; KEYS],
    velocity: [f32; KEYS],
    changed: [bool; KEYS],
}

impl Default for PianoState {
    fn default() -> PianoState {
        PianoState {
            pressed: [false; KEYS],
            velocity: [0.0; KEYS],
            changed: [false; KEYS],
        }
    }
}

impl PianoState {
    pub fn new() -> PianoState {
        Default::default()
    }

    /// Forget which keys changed, called at the start of a frame
    pub fn begin_frame(&mut self) {
        self.changed = [false; KEYS];
    }

    pub fn press(&mut self, key: u8, velocity: f32) {
        let k = key as usize;
        if k >= KEYS {
            log::debug!("Ignoring press of key {}", key);
            return;
        }
        self.pressed[k] = true;
        self.velocity[k] = velocity.max(0.0).min(1.0);
        self.changed[k] = true;
    }

    pub fn release(&mut self, key: u8) {
        let k = key as usize;
        if k >= KEYS {
            log::debug!("Ignoring release of key {}", key);
            return;
        }
        self.pressed[k] = false;
        self.velocity[k] = 0.0;
        self.changed[k] = true;
    }

    pub fn is_pressed(&self, key: usize) -> bool {
        self.pressed.get(key).copied().unwrap_or(false)
    }

    /// Velocity of a held key, 0 for released keys
    pub fn velocity(&self, key: usize) -> f32 {
        self.velocity.get(key).copied().unwrap_or(0.0)
    }

    pub fn changed(&self, key: usize) -> bool {
        self.changed.get(key).copied().unwrap_or(false)
    }

    /// Keys that changed since the last frame
    pub fn changed_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.changed
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(k, _)| k)
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.pressed
            .iter()
            .enumerate()
            .filter(|(_, p)| **p)
            .map(|(k, _)| k)
    }
}
