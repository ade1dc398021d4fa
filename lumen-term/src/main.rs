#[macro_use]
extern crate log;

mod demos;
mod preview;

use lumen_core::beat::{self, BeatSource};
use lumen_core::input::{InputEvent, InputQueue};
use lumen_core::{frames, recorder, visualizer, Rig};
use std::io::BufRead;
use std::{rc, sync::mpsc, thread, time};

/// Tap tempo fed from the command thread
#[derive(Debug)]
struct Tapper {
    source: beat::ManualBeatSource,
    taps: mpsc::Receiver<time::Instant>,
}

impl BeatSource for Tapper {
    fn hz(&self) -> f64 {
        self.source.hz()
    }

    fn beat_time(&self, at: time::Instant) -> f64 {
        self.source.beat_time(at)
    }

    fn poll(&mut self) {
        for at in self.taps.try_iter() {
            self.source.tap(at);
        }
    }
}

fn parse_command(line: &str) -> Option<InputEvent> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let number: u8 = words.next()?.parse().ok()?;
    let value: Option<f32> = words.next().and_then(|v| v.parse().ok());

    match command {
        "key" => Some(InputEvent::KeyDown {
            key: number,
            velocity: value.unwrap_or(1.0),
        }),
        "up" => Some(InputEvent::KeyUp { key: number }),
        "dial" => Some(InputEvent::Dial {
            number,
            value: value?,
        }),
        "press" => Some(InputEvent::Button {
            number,
            pressed: true,
        }),
        "release" => Some(InputEvent::Button {
            number,
            pressed: false,
        }),
        _ => None,
    }
}

/// Where stdin commands go
struct Commands {
    input: InputQueue,
    taps: mpsc::Sender<time::Instant>,
    /// Cleared once a tap found nobody listening
    tapping: bool,
}

impl Commands {
    fn new(input: InputQueue, taps: mpsc::Sender<time::Instant>) -> Commands {
        Commands {
            input,
            taps,
            tapping: true,
        }
    }

    /// `tap` taps the beat, everything else is handed to [`parse_command`].
    fn handle(&mut self, line: &str) {
        if line.trim() == "tap" {
            if self.taps.send(time::Instant::now()).is_err() && self.tapping {
                warn!("Ignoring taps, the beat follows the sync server");
                self.tapping = false;
            }
        } else if let Some(event) = parse_command(line) {
            self.input.push(event);
        } else {
            warn!("Unknown command {:?}", line.trim());
        }
    }
}

/// Read commands from stdin
fn spawn_commands(mut commands: Commands) {
    let spawned = thread::Builder::new()
        .name("commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(l) => commands.handle(&l),
                    Err(e) => {
                        warn!("stdin: {}", e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Can't read commands: {}", e);
    }
}

fn build_rig() -> Rig {
    let kind = lumen_core::CONFIG.get_or("term.rig", "grid".to_string());
    let leds = lumen_core::CONFIG.get_or("term.leds", 32);

    match &*kind {
        "line" => Rig::line(format!("line-{}", leds), leds, 0.1),
        _ => {
            let rows = lumen_core::CONFIG.get_or("term.rows", 8);
            Rig::grid(format!("grid-{}x{}", leds, rows), leds, rows, 0.1)
        }
    }
}

fn main() {
    lumen_core::default_config();
    lumen_core::default_log();

    let rig = rc::Rc::new(build_rig());
    let kind = lumen_core::CONFIG.get_or("term.visualization", "ripple".to_string());
    let headless = lumen_core::CONFIG.get_or("term.headless", false);
    let max_frames = lumen_core::CONFIG.get_or("term.frames", 0u64);

    let recorder = recorder::RecorderBuilder::new()
        .build()
        .expect("Can't start recorder");

    let mut registry = visualizer::Registry::new();
    demos::register(&mut registry);
    info!(
        "Visualizations: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );

    let mut orchestrator = frames::OrchestratorBuilder::new().build(registry);
    if !headless {
        orchestrator
            .add_sink(Box::new(preview::TerminalSink::stdout()))
            .expect("Can't attach preview");
    }
    orchestrator
        .configure(&kind, rig, Some(recorder.sample_buffer().clone()))
        .expect("Can't configure session");

    let (tap, taps) = mpsc::channel();
    spawn_commands(Commands::new(orchestrator.input(), tap));

    let mut beat: Box<dyn BeatSource> =
        match &*lumen_core::CONFIG.get_or("term.beat", "manual".to_string()) {
            "link" => Box::new(
                beat::LinkBuilder::new()
                    .build()
                    .expect("Can't start beat sync"),
            ),
            _ => Box::new(Tapper {
                source: beat::ManualBeatSource::new(time::Instant::now()),
                taps,
            }),
        };

    let result = orchestrator.run(&mut *beat, |frame| {
        if frame.frame % 600 == 599 {
            debug!(
                "Frame {}: average render time {:?}, volume {:.3}",
                frame.frame,
                frame.average_render_time,
                recorder.sample_buffer().volume(0.3)
            );
        }
        max_frames == 0 || frame.frame + 1 < max_frames
    });

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
