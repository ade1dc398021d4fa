use crate::analyzer;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::{sync::mpsc, thread};

/// Records from the default input device
///
/// The stream lives on its own thread, which only reports back whether starting it
/// worked and then parks for the rest of the program.
#[derive(Debug)]
pub struct CPalRecorder {
    buffer: analyzer::SampleBuffer,
}

fn start(rate: usize, buf: analyzer::SampleBuffer) -> Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device".to_string()))?;
    let channels = device
        .default_input_config()
        .map_err(|e| Error::Audio(e.to_string()))?
        .channels()
        .max(1);

    log::debug!(
        "Recording from {:?}, {} channels",
        device.name().unwrap_or_default(),
        channels
    );

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(rate as u32),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut chunk_buffer = Vec::with_capacity(256);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                chunk_buffer.clear();
                chunk_buffer.extend(data.chunks_exact(channels as usize).map(|frame| {
                    match frame {
                        [l, r, ..] => [*l, *r],
                        [m] => [*m, *m],
                        [] => [0.0, 0.0],
                    }
                }));
                buf.push(&chunk_buffer);
            },
            |e| log::error!("Audio stream: {}", e),
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;
    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}

impl CPalRecorder {
    pub fn new(rate: usize, buffer_size: usize) -> Result<CPalRecorder> {
        let buf = analyzer::SampleBuffer::new(buffer_size, rate);
        let (started, result) = mpsc::channel();

        {
            let buf = buf.clone();
            thread::Builder::new()
                .name("cpal-recorder".into())
                .spawn(move || match start(rate, buf) {
                    Ok(_stream) => {
                        let _ = started.send(Ok(()));
                        loop {
                            thread::park();
                        }
                    }
                    Err(e) => {
                        let _ = started.send(Err(e));
                    }
                })?;
        }

        result
            .recv()
            .map_err(|_| Error::Audio("recorder thread died".to_string()))??;

        Ok(CPalRecorder { buffer: buf })
    }
}

impl super::Recorder for CPalRecorder {
    fn sample_buffer(&self) -> &analyzer::SampleBuffer {
        &self.buffer
    }
}
