//! True-color terminal preview
use lumen_core::sink::Sink;
use lumen_core::{ColorBuffer, Result, Rig};
use std::collections;
use std::fmt::Write as _;
use std::io;

/// Draws each LED as a colored block, one terminal line per rig row
#[derive(Debug)]
pub struct TerminalSink<W: io::Write> {
    out: W,
    /// LED indices per line, in index order
    rows: Vec<Vec<usize>>,
    frame: String,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> TerminalSink<io::Stdout> {
        TerminalSink::new(io::stdout())
    }
}

impl<W: io::Write> TerminalSink<W> {
    pub fn new(out: W) -> TerminalSink<W> {
        TerminalSink {
            out,
            rows: Vec::new(),
            frame: String::new(),
        }
    }
}

impl<W: io::Write> Sink for TerminalSink<W> {
    fn attach(&mut self, rig: &Rig) -> Result<()> {
        let mut rows: collections::BTreeMap<u16, Vec<(u16, usize)>> = Default::default();
        for (i, led) in rig.leds().iter().enumerate() {
            rows.entry(led.row.unwrap_or(0))
                .or_default()
                .push((led.index, i));
        }

        self.rows = rows
            .into_values()
            .map(|mut row| {
                row.sort();
                row.into_iter().map(|(_, i)| i).collect()
            })
            .collect();

        // Clear the screen once, frames only move the cursor home
        self.out.write_all(b"\x1B[2J")?;
        Ok(())
    }

    fn send(&mut self, leds: &ColorBuffer) -> Result<()> {
        self.frame.clear();
        self.frame.push_str("\x1B[H");
        for row in self.rows.iter() {
            for led in row.iter() {
                if let Some(c) = leds.get(*led) {
                    let _ = write!(self.frame, "\x1B[48;2;{};{};{}m  ", c.r, c.g, c.b);
                }
            }
            self.frame.push_str("\x1B[0m\n");
        }

        self.out.write_all(self.frame.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}
