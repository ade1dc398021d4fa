//! A real-time LED visualization engine.
//!
//! `lumen-core` turns piano input, a beat clock, ambient audio and a handful of
//! physical dials and buttons into a color for every LED of a rig, sixty times a
//! second.
//!
//! # Example
//! ```rust
//! use lumen_core::{frames, visualizer, Color, Rig};
//! use std::{rc::Rc, time};
//!
//! // A visualization lighting up on every beat and fading out until the next one
//! struct Pulse;
//!
//! impl visualizer::Visualization for Pulse {
//!     fn render(&mut self, ctx: &mut frames::FrameContext) -> lumen_core::Result<()> {
//!         let fade = 1.0 - ctx.beat.progress_to_next_beat(ctx.now) as f32;
//!         ctx.leds.fill(Color::WHITE * fade);
//!         Ok(())
//!     }
//! }
//!
//! fn pulse(_: &mut visualizer::Setup) -> lumen_core::Result<Box<dyn visualizer::Visualization>> {
//!     Ok(Box::new(Pulse))
//! }
//!
//! fn main() -> lumen_core::Result<()> {
//!     // Initialize the logger.  Take a look at the sources if you want to customize
//!     // the logger.
//!     lumen_core::default_log();
//!
//!     // Load the default config sources.
//!     lumen_core::default_config();
//!
//!     let mut registry = visualizer::Registry::new();
//!     registry.register("pulse", false, pulse);
//!
//!     let mut orchestrator = frames::OrchestratorBuilder::new().build(registry);
//!     orchestrator.configure("pulse", Rc::new(Rig::line("strip", 30, 0.1)), None)?;
//!
//!     let mut beat = lumen_core::beat::ManualBeatSource::new(time::Instant::now());
//!     orchestrator.run(&mut beat, |frame| {
//!         // This is where you would hand the frame to your hardware
//!         frame.frame < 20
//!     })
//! }
//! ```
pub mod analyzer;
pub mod beat;
pub mod color;
pub mod controls;
pub mod error;
pub mod frames;
pub mod helpers;
pub mod input;
pub mod mapper;
pub mod recorder;
pub mod rig;
pub mod sink;
pub mod visualizer;

#[doc(inline)]
pub use crate::color::Color;
#[doc(inline)]
pub use crate::error::{Error, Result};
#[doc(inline)]
pub use crate::frames::{FrameContext, Orchestrator, OrchestratorBuilder};
#[doc(inline)]
pub use crate::rig::{ColorBuffer, LedDescriptor, Rig};

/// `ezconf` configuration
///
/// Usually you will call [`default_config`](fn.default_config.html) in the beginning
/// which will populate this object, but you can also specify your own custom config
/// sources.
///
/// # Example
/// To make use of this config, use code similar to this:
///
/// ```rust
/// # lumen_core::default_config();
/// let fps = lumen_core::CONFIG.get_or(
///     // Toml path to value
///     "frames.fps",
///     // Default value.  Type gets inferred from this
///     60.0,
/// );
/// ```
pub static CONFIG: ezconf::Config = ezconf::INIT;

/// Initialize config from default sources
///
/// The default sources are:
/// * `./lumen.toml`
/// * `./config/lumen.toml`
/// * Defaults from code
///
/// Returns whether a config file was loaded.  Calling it again once the config
/// is initialized leaves the config untouched and returns `false`.
pub fn default_config() -> bool {
    let loaded = CONFIG.init(
        [
            ezconf::Source::File("lumen.toml"),
            ezconf::Source::File("config/lumen.toml"),
        ]
        .iter(),
    );
    match loaded {
        Ok(true) => true,
        Ok(false) => {
            log::warn!("No config file found, using defaults");
            false
        }
        Err(()) => {
            log::debug!("Config already initialized");
            false
        }
    }
}

/// Initialize logger
///
/// By default, enable debug output in debug-builds.
pub fn default_log() {
    #[cfg(not(debug_assertions))]
    env_logger::init();

    #[cfg(debug_assertions)]
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    color_backtrace::install();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_default_config_twice() {
        // No config file next to the crate, so both calls fall back to defaults
        assert!(!super::default_config());
        assert!(!super::default_config());
        assert_eq!(super::CONFIG.get_or("frames.fps", 60.0), 60.0);
    }
}
