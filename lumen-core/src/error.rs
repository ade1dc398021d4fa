//! Error type shared by the whole engine
use std::fmt;

/// Kind of a controller handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Dial,
    Button,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlKind::Dial => f.write_str("dial"),
            ControlKind::Button => f.write_str("button"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown visualization {0:?}")]
    UnknownVisualization(String),

    #[error("{kind} {number} is already in use")]
    HandleTaken { kind: ControlKind, number: u8 },

    #[error("{kind} {number} does not exist")]
    HandleOutOfRange { kind: ControlKind, number: u8 },

    #[error("no free {0} left")]
    PoolExhausted(ControlKind),

    #[error("invalid dial range [{min}, {max}]")]
    InvalidRange { min: f32, max: f32 },

    #[error("control handle belongs to a previous session")]
    StaleHandle,

    #[error("LEDs of rig {0:?} do not share a common plane")]
    NonCoplanar(String),

    #[error("rig {0:?} has no LEDs")]
    EmptyRig(String),

    #[error("can't allocate a {width}x{height} raster")]
    Raster { width: u32, height: u32 },

    #[error("buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("channel {channel}: {reason}")]
    ChannelLayout { channel: u8, reason: String },

    #[error("could not set up filter: {0}")]
    Filter(String),

    #[error("diagnostic output {0:?} was written twice in one frame")]
    DiagnosticWrittenTwice(&'static str),

    #[error("unknown recorder {0:?}")]
    UnknownRecorder(String),

    #[error("audio device: {0}")]
    Audio(String),

    #[error("no session configured")]
    NotConfigured,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
