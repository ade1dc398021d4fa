//! Demo visualizations
use lumen_core::analyzer::{FeatureBuilder, SignalAnalyzer, SignalBuilder};
use lumen_core::controls::{Button, ButtonBuilder, Dial, DialBuilder};
use lumen_core::frames::FrameContext;
use lumen_core::input::KEYS;
use lumen_core::mapper::SpatialMapper;
use lumen_core::visualizer::{Registry, Setup, Visualization};
use lumen_core::{Color, Result};

pub fn register(registry: &mut Registry) {
    registry
        .register("solid", false, Solid::create)
        .register("keys", false, Keys::create)
        .register("ripple", true, Ripple::create);
}

fn decay(level: f32, dt: f32, half_life: f32) -> f32 {
    level * 0.5f32.powf(dt / half_life.max(1e-3))
}

/// Whole rig pulsing on the beat
pub struct Solid {
    hue: Dial,
    flash: Button,
    flash_level: f32,
}

impl Solid {
    fn create(setup: &mut Setup) -> Result<Box<dyn Visualization>> {
        Ok(Box::new(Solid {
            hue: setup
                .controls
                .create_dial(DialBuilder::new().range(0.0, 1.0).initial(0.6))?,
            flash: setup.controls.create_button(&ButtonBuilder::new())?,
            flash_level: 0.0,
        }))
    }
}

impl Visualization for Solid {
    fn render(&mut self, ctx: &mut FrameContext) -> Result<()> {
        if self.flash.pressed() {
            self.flash_level = 1.0;
        }
        self.flash_level = decay(self.flash_level, ctx.dt, 0.1);

        let pulse = (1.0 - ctx.beat.progress_to_next_beat(ctx.now) as f32).powi(2);
        let level = pulse.max(self.flash_level);

        ctx.leds
            .fill(Color::from_hsv(self.hue.value(), 1.0 - self.flash_level, level));
        ctx.series.set(vec![pulse, self.flash_level])
    }
}

/// Piano keys spread over the rig
pub struct Keys {
    levels: Vec<f32>,
    hues: Vec<f32>,
    half_life: Dial,
}

impl Keys {
    fn create(setup: &mut Setup) -> Result<Box<dyn Visualization>> {
        Ok(Box::new(Keys {
            levels: vec![0.0; setup.rig.len()],
            hues: vec![0.0; setup.rig.len()],
            half_life: setup
                .controls
                .create_dial(DialBuilder::new().range(0.05, 2.0).initial(0.3))?,
        }))
    }
}

impl Visualization for Keys {
    fn render(&mut self, ctx: &mut FrameContext) -> Result<()> {
        let n = self.levels.len().max(1);
        let half_life = self.half_life.value();

        for (i, (level, hue)) in self.levels.iter_mut().zip(self.hues.iter_mut()).enumerate() {
            let key = i * KEYS / n;
            if ctx.piano.is_pressed(key) {
                *level = level.max(ctx.piano.velocity(key));
                *hue = key as f32 / KEYS as f32;
            } else {
                *level = decay(*level, ctx.dt, half_life);
            }
            ctx.leds.set(i, Color::from_hsv(*hue, 0.8, *level));
        }

        ctx.heatmap.set(self.levels.clone())
    }
}

/// A ring per beat, colored by the music
pub struct Ripple {
    mapper: SpatialMapper,
    signals: SignalAnalyzer,
    rings: Vec<(f32, Color)>,
    hue: f32,
}

impl Ripple {
    fn create(setup: &mut Setup) -> Result<Box<dyn Visualization>> {
        let sampler = match setup.audio.take() {
            Some(audio) => Some(FeatureBuilder::new().build(audio)?),
            None => {
                warn!("Ripple without audio, only beats will show");
                None
            }
        };

        Ok(Box::new(Ripple {
            mapper: setup.take_mapper()?,
            signals: SignalBuilder::new().build(sampler),
            rings: Vec::new(),
            hue: 0.0,
        }))
    }
}

impl Visualization for Ripple {
    fn render(&mut self, ctx: &mut FrameContext) -> Result<()> {
        let s = self.signals.update(ctx.beat, ctx.now, ctx.dt);

        let (w, h) = (
            self.mapper.mapping().width() as f32,
            self.mapper.mapping().height() as f32,
        );
        let reach = (w * w + h * h).sqrt() / 2.0;

        if s.new_beat {
            self.hue = (self.hue + 0.13).fract();
            self.rings.push((0.0, Color::from_hsv(self.hue, 1.0, 1.0)));
        }
        if s.strong_beat {
            self.rings.push((0.0, Color::WHITE));
        }

        // A ring travels to the edge within one beat
        let speed = reach * ctx.beat.hz() as f32;
        for ring in self.rings.iter_mut() {
            ring.0 += speed * ctx.dt;
        }
        self.rings.retain(|(r, _)| *r < reach);

        let background = if s.drop {
            Color::WHITE
        } else {
            Color::from_hsv(self.hue + 0.5, 1.0, s.low.min(1.0) * 0.5)
        };
        self.mapper.clear(background);

        let mut paint = tiny_skia::Paint::default();
        paint.anti_alias = true;
        let stroke = tiny_skia::Stroke {
            width: 2.0 + s.high.min(1.0) * 8.0,
            ..Default::default()
        };
        for (radius, color) in self.rings.iter() {
            if let Some(circle) = tiny_skia::PathBuilder::from_circle(w / 2.0, h / 2.0, radius.max(0.5)) {
                paint.set_color((*color).into());
                self.mapper.raster_mut().stroke_path(
                    &circle,
                    &paint,
                    &stroke,
                    tiny_skia::Transform::identity(),
                    None,
                );
            }
        }

        self.mapper.sample_to_leds(ctx.leds);
        ctx.series.set(vec![s.low, s.high])
    }
}
