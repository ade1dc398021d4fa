//! Frame orchestration
//!
//! The [`Orchestrator`] owns the active session and drives it one frame at a time:
//!
//! 1. Measure the time since the previous frame
//! 2. Fold queued input events into the piano and controller state
//! 3. Let the visualization render into the session's color buffer
//! 4. Apply brightness and derez to produce the output buffer
//! 5. Hand the output to every sink
//! 6. Track the average render time
//!
//! Frames are paced by a [`FrameScheduler`] whose targets advance by a fixed interval
//! from the previous target, so a single slow frame does not shift the phase of all
//! following ones.
use crate::analyzer;
use crate::beat::BeatSource;
use crate::controls::{self, ControlAllocator, SharedBank};
use crate::error::{Error, Result};
use crate::input::{InputEvent, InputQueue, PianoState};
use crate::mapper::{MapperBuilder, MapperCache, MapperOptions, SpatialMapper};
use crate::rig::{ColorBuffer, Rig};
use crate::sink::Sink;
use crate::visualizer::{Registry, Setup, Visualization};
use rand::{Rng, SeedableRng};
use std::{collections, rc, thread, time};

/// An output that may be written at most once per frame
#[derive(Debug)]
pub struct Slot<T> {
    name: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    pub fn new(name: &'static str) -> Slot<T> {
        Slot { name, value: None }
    }

    pub fn set(&mut self, value: T) -> Result<()> {
        if self.value.is_some() {
            return Err(Error::DiagnosticWrittenTwice(self.name));
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    fn take(&mut self) -> Option<T> {
        self.value.take()
    }
}

/// Everything a visualization sees while rendering one frame
pub struct FrameContext<'a> {
    /// Time since the previous frame
    pub elapsed: time::Duration,
    /// `elapsed` in seconds
    pub dt: f32,
    /// `elapsed` in milliseconds
    pub dt_ms: f32,
    pub now: time::Instant,
    pub frame: u64,

    pub rig: &'a Rig,
    pub beat: &'a dyn BeatSource,
    pub piano: &'a PianoState,
    pub leds: &'a mut ColorBuffer,

    /// Optional per-LED debug values
    pub heatmap: Slot<Vec<f32>>,
    /// Optional time series points, one value per trace
    pub series: Slot<Vec<f32>>,
}

/// Pacing of frames at a fixed interval
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: time::Duration,
    target: Option<time::Instant>,
}

impl FrameScheduler {
    pub fn new(interval: time::Duration) -> FrameScheduler {
        FrameScheduler {
            interval,
            target: None,
        }
    }

    pub fn interval(&self) -> time::Duration {
        self.interval
    }

    /// Target time of the next frame, never before `now`
    pub fn next_target(&mut self, now: time::Instant) -> time::Instant {
        let target = match self.target {
            Some(prev) => (prev + self.interval).max(now),
            None => now,
        };
        self.target = Some(target);
        target
    }
}

/// Moving average of render durations
#[derive(Debug, Clone)]
pub struct RenderTimings {
    window: collections::VecDeque<time::Duration>,
    capacity: usize,
}

impl RenderTimings {
    pub fn new(capacity: usize) -> RenderTimings {
        RenderTimings {
            window: collections::VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, duration: time::Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(duration);
    }

    pub fn average(&self) -> time::Duration {
        if self.window.is_empty() {
            return time::Duration::from_secs(0);
        }
        self.window.iter().sum::<time::Duration>() / self.window.len() as u32
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// Result of one frame
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub frame: u64,
    pub elapsed: time::Duration,
    pub leds: ColorBuffer,
    pub heatmap: Option<Vec<f32>>,
    pub series: Option<Vec<f32>>,
    pub average_render_time: time::Duration,
}

/// The active visualization together with everything it was built for
pub struct Session {
    kind: String,
    rig: rc::Rc<Rig>,
    visualization: Box<dyn Visualization>,
    controls: ControlAllocator,

    /// Buffer the visualization draws into, kept between frames
    leds: ColorBuffer,
    /// Buffer after post-processing, what sinks last received
    output: ColorBuffer,

    frame: u64,
    last_frame: Option<time::Instant>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {{ kind: {:?}, rig: {:?}, frame: {} }}",
            self.kind,
            self.rig.id(),
            self.frame
        )
    }
}

impl Session {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn rig(&self) -> &rc::Rc<Rig> {
        &self.rig
    }

    /// Allocator of this session, for controls created outside the visualization
    pub fn controls(&mut self) -> &mut ControlAllocator {
        &mut self.controls
    }

    pub fn output(&self) -> &ColorBuffer {
        &self.output
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[derive(Debug, Default)]
pub struct OrchestratorBuilder {
    /// Target frame rate
    ///
    /// Can also be set from config as `"frames.fps"`.
    pub fps: Option<f32>,

    /// Initial position of the brightness dial
    ///
    /// Can also be set from config as `"frames.brightness"`.
    pub brightness: Option<f32>,

    /// Initial position of the derez dial
    ///
    /// Can also be set from config as `"frames.derez"`.
    pub derez: Option<f32>,

    /// Number of frames the render time is averaged over
    ///
    /// Can also be set from config as `"frames.timing_window"`.
    pub timing_window: Option<usize>,

    /// Number of diagnostic series points kept
    ///
    /// Can also be set from config as `"frames.series_length"`.
    pub series_length: Option<usize>,

    /// Seed for the derez randomness, from entropy if unset
    ///
    /// Can also be set from config as `"frames.seed"`.
    pub seed: Option<u64>,

    pub mapper: MapperBuilder,
}

impl OrchestratorBuilder {
    pub fn new() -> OrchestratorBuilder {
        Default::default()
    }

    pub fn fps(&mut self, fps: f32) -> &mut OrchestratorBuilder {
        self.fps = Some(fps);
        self
    }

    pub fn brightness(&mut self, brightness: f32) -> &mut OrchestratorBuilder {
        self.brightness = Some(brightness);
        self
    }

    pub fn derez(&mut self, derez: f32) -> &mut OrchestratorBuilder {
        self.derez = Some(derez);
        self
    }

    pub fn timing_window(&mut self, frames: usize) -> &mut OrchestratorBuilder {
        self.timing_window = Some(frames);
        self
    }

    pub fn series_length(&mut self, points: usize) -> &mut OrchestratorBuilder {
        self.series_length = Some(points);
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut OrchestratorBuilder {
        self.seed = Some(seed);
        self
    }

    pub fn max_dimension(&mut self, pixels: u32) -> &mut OrchestratorBuilder {
        self.mapper.max_dimension(pixels);
        self
    }

    pub fn capture_radius(&mut self, radius: f32) -> &mut OrchestratorBuilder {
        self.mapper.capture_radius(radius);
        self
    }

    pub fn build(&mut self, registry: Registry) -> Orchestrator {
        Orchestrator::from_builder(self, registry)
    }
}

pub struct Orchestrator {
    registry: Registry,
    cache: MapperCache,
    mapper_options: MapperOptions,

    bank: SharedBank,
    input: InputQueue,
    piano: PianoState,

    scheduler: FrameScheduler,
    session: Option<Session>,
    sinks: Vec<Box<dyn Sink>>,
    /// Rig the sinks were last attached to
    attached: Option<rc::Rc<Rig>>,

    timings: RenderTimings,
    rng: rand::rngs::StdRng,
    series: collections::VecDeque<Vec<f32>>,
    series_length: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Orchestrator {{ session: {:?}, sinks: {}, interval: {:?} }}",
            self.session,
            self.sinks.len(),
            self.scheduler.interval()
        )
    }
}

impl Orchestrator {
    pub fn from_builder(build: &OrchestratorBuilder, registry: Registry) -> Orchestrator {
        let fps = build
            .fps
            .unwrap_or_else(|| crate::CONFIG.get_or("frames.fps", 60.0));
        let brightness = build
            .brightness
            .unwrap_or_else(|| crate::CONFIG.get_or("frames.brightness", 1.0));
        let derez = build
            .derez
            .unwrap_or_else(|| crate::CONFIG.get_or("frames.derez", 0.0));
        let timing_window = build
            .timing_window
            .unwrap_or_else(|| crate::CONFIG.get_or("frames.timing_window", 20));
        let series_length = build
            .series_length
            .unwrap_or_else(|| crate::CONFIG.get_or("frames.series_length", 600));
        let seed = build
            .seed
            .or_else(|| crate::CONFIG.get_or("frames.seed", None::<u64>));
        let mapper_options = build.mapper.options();

        let fps = if fps > 0.0 { fps } else { 60.0 };
        let interval = time::Duration::from_nanos((1e9 / f64::from(fps)).round() as u64);

        log::debug!("Orchestrator:");
        log::debug!("    FPS           = {:8.2}", fps);
        log::debug!("    Brightness    = {:8.2}", brightness);
        log::debug!("    Derez         = {:8.2}", derez);
        log::debug!("    Timing Window = {:8}", timing_window);
        log::debug!("    Series Length = {:8}", series_length);
        log::debug!("    Seed          = {:?}", seed);
        log::debug!("    Raster Size   = {:8}", mapper_options.max_dimension);
        log::debug!("    Capture       = {:8.3}", mapper_options.capture_radius);

        let bank = controls::ControlBank::shared();
        {
            let mut bank = bank.borrow_mut();
            bank.set_dial(controls::BRIGHTNESS_DIAL, brightness);
            bank.set_dial(controls::DEREZ_DIAL, derez);
        }

        Orchestrator {
            registry,
            cache: MapperCache::new(),
            mapper_options,

            bank,
            input: InputQueue::new(),
            piano: PianoState::new(),

            scheduler: FrameScheduler::new(interval),
            session: None,
            sinks: Vec::new(),
            attached: None,

            timings: RenderTimings::new(timing_window),
            rng: match seed {
                Some(s) => rand::rngs::StdRng::seed_from_u64(s),
                None => rand::rngs::StdRng::from_entropy(),
            },
            series: collections::VecDeque::with_capacity(series_length),
            series_length,
        }
    }

    /// Handle for input collaborators to queue events into
    pub fn input(&self) -> InputQueue {
        self.input.clone()
    }

    pub fn bank(&self) -> &SharedBank {
        &self.bank
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn piano(&self) -> &PianoState {
        &self.piano
    }

    /// Diagnostic series points, oldest first
    pub fn series(&self) -> impl Iterator<Item = &Vec<f32>> {
        self.series.iter()
    }

    pub fn average_render_time(&self) -> time::Duration {
        self.timings.average()
    }

    /// Register a sink, attaching it to the current rig right away
    pub fn add_sink(&mut self, mut sink: Box<dyn Sink>) -> Result<()> {
        if let Some(ref session) = self.session {
            sink.attach(&session.rig)?;
        }
        self.sinks.push(sink);
        Ok(())
    }

    /// Tear down the current session and start a new one
    pub fn configure(
        &mut self,
        kind: &str,
        rig: rc::Rc<Rig>,
        audio: Option<analyzer::SampleBuffer>,
    ) -> Result<&mut Session> {
        self.reset();

        let entry = self.registry.get(kind)?;
        let mapper = if entry.needs_mapper {
            Some(SpatialMapper::initialize(
                &rig,
                &self.mapper_options,
                &mut self.cache,
            )?)
        } else {
            None
        };

        let unchanged = self
            .attached
            .as_ref()
            .map_or(false, |a| rc::Rc::ptr_eq(a, &rig) || **a == *rig);
        if !unchanged {
            for sink in self.sinks.iter_mut() {
                sink.attach(&rig)?;
            }
            self.attached = Some(rig.clone());
        }

        let mut controls = ControlAllocator::new(self.bank.clone());
        let visualization = {
            let mut setup = Setup {
                rig: &rig,
                controls: &mut controls,
                mapper,
                audio,
            };
            (entry.factory)(&mut setup)?
        };

        log::info!("Session: {:?} on {:?} ({} LEDs)", kind, rig.id(), rig.len());

        let session = Session {
            kind: kind.to_string(),
            leds: rig.buffer(),
            output: rig.buffer(),
            rig,
            visualization,
            controls,

            frame: 0,
            last_frame: None,
        };
        Ok(self.session.insert(session))
    }

    /// End the current session
    ///
    /// Control allocations, diagnostic series and piano state are cleared.
    /// Brightness and derez keep their values.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("Ending session {:?}", session.kind);
        }
        self.bank.borrow_mut().reset();
        self.input.clear();
        self.piano = PianoState::new();
        self.series.clear();
        self.timings.clear();
    }

    fn apply_input(&mut self) {
        let mut bank = self.bank.borrow_mut();
        bank.begin_frame();
        self.piano.begin_frame();

        for event in self.input.drain() {
            match event {
                InputEvent::KeyDown { key, velocity } => self.piano.press(key, velocity),
                InputEvent::KeyUp { key } => self.piano.release(key),
                InputEvent::Dial { number, value } => bank.set_dial(number, value),
                InputEvent::Button { number, pressed } => bank.set_button(number, pressed),
            }
        }
    }

    pub fn render_frame(
        &mut self,
        beat: &mut dyn BeatSource,
        now: time::Instant,
    ) -> Result<FrameOutput> {
        if self.session.is_none() {
            return Err(Error::NotConfigured);
        }
        let started = time::Instant::now();

        beat.poll();
        self.apply_input();

        let session = self.session.as_mut().ok_or(Error::NotConfigured)?;
        let elapsed = match session.last_frame {
            Some(last) => now.saturating_duration_since(last),
            None => self.scheduler.interval(),
        };
        session.last_frame = Some(now);

        let mut ctx = FrameContext {
            elapsed,
            dt: elapsed.as_secs_f32(),
            dt_ms: elapsed.as_secs_f32() * 1000.0,
            now,
            frame: session.frame,

            rig: &session.rig,
            beat: &*beat,
            piano: &self.piano,
            leds: &mut session.leds,

            heatmap: Slot::new("heatmap"),
            series: Slot::new("series"),
        };
        session.visualization.render(&mut ctx)?;
        let heatmap = ctx.heatmap.take();
        let series = ctx.series.take();

        let (brightness, derez) = {
            let bank = self.bank.borrow();
            (bank.brightness(), bank.derez())
        };
        for (i, color) in session.leds.iter().enumerate() {
            if derez > 0.0 && self.rng.gen::<f32>() < derez {
                continue;
            }
            session.output.set(i, *color * brightness);
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.send(&session.output) {
                log::warn!("Sink failed: {}", e);
            }
        }

        if let Some(ref points) = series {
            if self.series.len() == self.series_length {
                self.series.pop_front();
            }
            if self.series_length > 0 {
                self.series.push_back(points.clone());
            }
        }

        let output = FrameOutput {
            frame: session.frame,
            elapsed,
            leds: session.output.clone(),
            heatmap,
            series,
            average_render_time: time::Duration::from_secs(0),
        };
        session.frame += 1;

        let duration = started.elapsed();
        self.timings.push(duration);
        log::trace!("Frame {}: rendered in {:?}", output.frame, duration);

        Ok(FrameOutput {
            average_render_time: self.timings.average(),
            ..output
        })
    }

    /// Render frames at the target rate until `keep_going` returns false
    pub fn run<F>(&mut self, beat: &mut dyn BeatSource, mut keep_going: F) -> Result<()>
    where
        F: FnMut(&FrameOutput) -> bool,
    {
        loop {
            let target = self.scheduler.next_target(time::Instant::now());
            let now = time::Instant::now();
            if target > now {
                thread::sleep(target - now);
            }

            let output = self.render_frame(beat, time::Instant::now())?;
            if !keep_going(&output) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beat::ManualBeatSource;
    use crate::color::Color;
    use crate::controls::{DialBuilder, BRIGHTNESS_DIAL, DEREZ_DIAL};
    use std::time::Duration;

    /// Alternates between red and blue on every frame
    struct Blink;

    impl Visualization for Blink {
        fn render(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
            let color = if ctx.frame % 2 == 0 {
                Color::RED
            } else {
                Color::BLUE
            };
            ctx.leds.fill(color);
            ctx.series.set(vec![ctx.dt_ms])?;
            Ok(())
        }
    }

    fn blink(setup: &mut Setup<'_>) -> Result<Box<dyn Visualization>> {
        setup.controls.create_dial(DialBuilder::new().range(0.0, 10.0))?;
        Ok(Box::new(Blink))
    }

    struct Chatty;

    impl Visualization for Chatty {
        fn render(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
            ctx.heatmap.set(vec![0.0; ctx.leds.len()])?;
            ctx.heatmap.set(vec![1.0; ctx.leds.len()])
        }
    }

    fn chatty(_: &mut Setup<'_>) -> Result<Box<dyn Visualization>> {
        Ok(Box::new(Chatty))
    }

    /// A distinct color on every frame
    struct Counter;

    impl Visualization for Counter {
        fn render(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
            ctx.leds.fill(frame_color(ctx.frame));
            Ok(())
        }
    }

    fn frame_color(frame: u64) -> Color {
        Color::new(frame as u8, (frame >> 8) as u8, 0x80)
    }

    fn counter(_: &mut Setup<'_>) -> Result<Box<dyn Visualization>> {
        Ok(Box::new(Counter))
    }

    fn mapped(setup: &mut Setup<'_>) -> Result<Box<dyn Visualization>> {
        setup.take_mapper()?;
        Ok(Box::new(Blink))
    }

    /// Paints the whole raster red through the mapper
    struct Paint(SpatialMapper);

    impl Visualization for Paint {
        fn render(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
            self.0.clear(Color::RED);
            self.0.sample_to_leds(ctx.leds);
            Ok(())
        }
    }

    fn paint(setup: &mut Setup<'_>) -> Result<Box<dyn Visualization>> {
        Ok(Box::new(Paint(setup.take_mapper()?)))
    }

    fn orchestrator() -> Orchestrator {
        let mut registry = Registry::new();
        registry
            .register("blink", false, blink)
            .register("chatty", false, chatty)
            .register("counter", false, counter)
            .register("mapped", true, mapped)
            .register("paint", true, paint);

        OrchestratorBuilder::new()
            .fps(50.0)
            .brightness(1.0)
            .derez(0.0)
            .timing_window(20)
            .series_length(4)
            .seed(7)
            .max_dimension(32)
            .capture_radius(0.5)
            .build(registry)
    }

    fn beat(t0: time::Instant) -> ManualBeatSource {
        ManualBeatSource::with_bpm(120.0, 40.0, t0)
    }

    #[derive(Debug, Default, Clone)]
    struct Counting {
        sent: rc::Rc<std::cell::Cell<usize>>,
        fail: bool,
    }

    impl Sink for Counting {
        fn send(&mut self, _leds: &ColorBuffer) -> Result<()> {
            self.sent.set(self.sent.get() + 1);
            if self.fail {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "unplugged",
                )))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_unconfigured() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        assert!(matches!(
            o.render_frame(&mut beat(t0), t0),
            Err(Error::NotConfigured)
        ));
        assert!(matches!(
            o.configure("nope", rc::Rc::new(Rig::line("l", 3, 1.0)), None),
            Err(Error::UnknownVisualization(_))
        ));
        assert!(o.session().is_none());
    }

    #[test]
    fn test_elapsed() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);
        o.configure("blink", rc::Rc::new(Rig::line("l", 3, 1.0)), None)
            .unwrap();

        let first = o.render_frame(&mut beat, t0).unwrap();
        assert_eq!(first.elapsed, Duration::from_millis(20));
        let dt_ms = first.series.unwrap()[0];
        assert!((dt_ms - 20.0).abs() < 1e-3);

        let second = o.render_frame(&mut beat, t0 + Duration::from_millis(35)).unwrap();
        assert_eq!(second.elapsed, Duration::from_millis(35));
        assert_eq!(second.frame, 1);
        let dt_ms = second.series.unwrap()[0];
        assert!((dt_ms - 35.0).abs() < 1e-3);
    }

    #[test]
    fn test_series_bounded() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);
        o.configure("blink", rc::Rc::new(Rig::line("l", 3, 1.0)), None)
            .unwrap();

        for i in 0..10 {
            o.render_frame(&mut beat, t0 + Duration::from_millis(20 * i))
                .unwrap();
        }
        assert_eq!(o.series().count(), 4);
        assert!(o.average_render_time() > Duration::from_secs(0));

        o.reset();
        assert_eq!(o.series().count(), 0);
    }

    #[test]
    fn test_diagnostic_written_twice() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        o.configure("chatty", rc::Rc::new(Rig::line("l", 3, 1.0)), None)
            .unwrap();
        assert!(matches!(
            o.render_frame(&mut beat(t0), t0),
            Err(Error::DiagnosticWrittenTwice("heatmap"))
        ));
    }

    #[test]
    fn test_brightness() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);
        o.configure("blink", rc::Rc::new(Rig::line("l", 2, 1.0)), None)
            .unwrap();

        o.input().push(InputEvent::Dial {
            number: BRIGHTNESS_DIAL,
            value: 0.5,
        });
        let out = o.render_frame(&mut beat, t0).unwrap();
        assert_eq!(out.leds.get(0), Some(Color::RED * 0.5));
    }

    #[test]
    fn test_derez_converges() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);
        o.configure("counter", rc::Rc::new(Rig::line("l", 500, 1.0)), None)
            .unwrap();
        o.input().push(InputEvent::Dial {
            number: DEREZ_DIAL,
            value: 0.3,
        });

        let frames = 200;
        let mut updated = 0;
        for i in 0..frames {
            let out = o
                .render_frame(&mut beat, t0 + Duration::from_millis(20 * i))
                .unwrap();
            updated += out
                .leds
                .iter()
                .filter(|c| **c == frame_color(out.frame))
                .count();
        }

        let fraction = updated as f64 / (500 * frames) as f64;
        assert!((fraction - 0.7).abs() < 0.02, "fraction = {}", fraction);
    }

    #[test]
    fn test_reset_keeps_settings() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);
        o.configure("blink", rc::Rc::new(Rig::line("l", 2, 1.0)), None)
            .unwrap();

        let input = o.input();
        input.push(InputEvent::Dial {
            number: BRIGHTNESS_DIAL,
            value: 0.0,
        });
        input.push(InputEvent::Dial {
            number: DEREZ_DIAL,
            value: 1.0,
        });
        input.push(InputEvent::Dial {
            number: 1,
            value: 0.7,
        });
        input.push(InputEvent::KeyDown {
            key: 40,
            velocity: 0.8,
        });
        o.render_frame(&mut beat, t0).unwrap();
        assert!(o.piano().is_pressed(40));

        let generation = o.bank().borrow().generation();
        o.configure("blink", rc::Rc::new(Rig::line("l", 2, 1.0)), None)
            .unwrap();

        let bank = o.bank().borrow();
        assert_eq!(bank.generation(), generation + 1);
        assert_eq!(bank.brightness(), controls::MIN_KEPT_BRIGHTNESS);
        assert_eq!(bank.derez(), controls::MAX_KEPT_DEREZ);
        assert_eq!(bank.dial(1), 0.0);
        assert!(!o.piano().is_pressed(40));
    }

    #[test]
    fn test_controls_freed_on_configure() {
        let mut o = orchestrator();
        let rig = rc::Rc::new(Rig::line("l", 2, 1.0));
        o.configure("blink", rig.clone(), None).unwrap();
        // blink grabbed dial 1 again, so the next free one is 2
        let session = o.configure("blink", rig, None).unwrap();
        let dial = session.controls().create_dial(&DialBuilder::new()).unwrap();
        assert_eq!(dial.number(), 2);
    }

    #[test]
    fn test_sinks() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);

        let broken = Counting {
            fail: true,
            ..Default::default()
        };
        let working = Counting::default();
        o.add_sink(Box::new(broken.clone())).unwrap();
        o.add_sink(Box::new(working.clone())).unwrap();

        o.configure("mapped", rc::Rc::new(Rig::grid("g", 3, 3, 1.0)), None)
            .unwrap();
        let out = o.render_frame(&mut beat, t0).unwrap();

        assert_eq!(broken.sent.get(), 1);
        assert_eq!(working.sent.get(), 1);
        assert_eq!(out.leds.get(4), Some(Color::RED));
    }

    /// Counts the lit LEDs of the last complete frame
    #[derive(Debug, Default, Clone)]
    struct Lit {
        pending: usize,
        lit: rc::Rc<std::cell::Cell<usize>>,
        flushed: rc::Rc<std::cell::Cell<usize>>,
    }

    impl crate::sink::ChannelWriter for Lit {
        fn write(&mut self, _channel: u8, colors: &[Color]) -> Result<()> {
            self.pending += colors.iter().filter(|c| !c.is_black()).count();
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.lit.set(std::mem::take(&mut self.pending));
            self.flushed.set(self.flushed.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_rig_changed_under_same_id() {
        let mut o = orchestrator();
        let t0 = time::Instant::now();
        let mut beat = beat(t0);

        let lit = Lit::default();
        o.add_sink(Box::new(crate::sink::ChannelSink::new(lit.clone())))
            .unwrap();

        o.configure("paint", rc::Rc::new(Rig::grid("rig", 2, 2, 1.0)), None)
            .unwrap();
        let out = o.render_frame(&mut beat, t0).unwrap();
        assert_eq!(out.leds.iter().filter(|c| **c == Color::RED).count(), 4);
        assert_eq!((lit.lit.get(), lit.flushed.get()), (4, 1));

        o.configure("paint", rc::Rc::new(Rig::grid("rig", 4, 4, 1.0)), None)
            .unwrap();
        let out = o
            .render_frame(&mut beat, t0 + Duration::from_millis(20))
            .unwrap();
        assert_eq!(out.leds.len(), 16);
        assert_eq!(out.leds.iter().filter(|c| **c == Color::RED).count(), 16);
        assert_eq!((lit.lit.get(), lit.flushed.get()), (16, 2));

        // An equal rig in a new allocation keeps the sinks as they are
        o.configure("paint", rc::Rc::new(Rig::grid("rig", 4, 4, 1.0)), None)
            .unwrap();
        o.render_frame(&mut beat, t0 + Duration::from_millis(40))
            .unwrap();
        assert_eq!((lit.lit.get(), lit.flushed.get()), (16, 3));
    }

    #[test]
    fn test_mapper_needs_plane() {
        use crate::rig::{LedDescriptor, Point};

        let mut o = orchestrator();
        let cube = Rig::new(
            "cube",
            vec![
                LedDescriptor::new(Point::new(0.0, 0.0, 0.0), 0, 0),
                LedDescriptor::new(Point::new(1.0, 1.0, 1.0), 0, 1),
            ],
        );
        assert!(matches!(
            o.configure("mapped", rc::Rc::new(cube), None),
            Err(Error::NonCoplanar(_))
        ));
    }

    #[test]
    fn test_scheduler() {
        let t0 = time::Instant::now();
        let ms = Duration::from_millis;
        let mut s = FrameScheduler::new(ms(20));

        assert_eq!(s.next_target(t0), t0);
        assert_eq!(s.next_target(t0 + ms(5)), t0 + ms(20));
        // a slightly late frame keeps the phase
        assert_eq!(s.next_target(t0 + ms(27)), t0 + ms(40));
        // a badly late one never targets the past
        assert_eq!(s.next_target(t0 + ms(95)), t0 + ms(95));
        assert_eq!(s.next_target(t0 + ms(96)), t0 + ms(115));
    }

    #[test]
    fn test_scheduler_monotonic() {
        let t0 = time::Instant::now();
        let mut s = FrameScheduler::new(Duration::from_millis(16));
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut now = t0;
        let mut last = t0;

        for _ in 0..1000 {
            now += Duration::from_micros(rng.gen_range(0..40_000));
            let target = s.next_target(now);
            assert!(target >= now);
            assert!(target >= last);
            last = target;
        }
    }

    #[test]
    fn test_timings() {
        let mut t = RenderTimings::new(2);
        assert_eq!(t.average(), Duration::from_secs(0));
        t.push(Duration::from_millis(10));
        t.push(Duration::from_millis(20));
        t.push(Duration::from_millis(40));
        assert_eq!(t.average(), Duration::from_millis(30));
    }
}
