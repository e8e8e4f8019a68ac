//! Microphone capture on the audio device's realtime thread.
//!
//! The device callback only copies samples into a ring buffer. A dedicated
//! pump thread downmixes, resamples to the wire rate and hands out fixed-size
//! PCM16 little-endian frames through a callback. Whether samples are kept at
//! all is decided by an atomic flag. `stop()` waits until the pump has handed
//! out the partial frame of the utterance it ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd};
use rubato::{FastFixedIn, Resampler};

use crate::audio::{self, ToBinary};

/// Frames the resampler consumes per call.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Seconds of device audio the ring buffer can hold before the pump catches up.
const RING_SECONDS: usize = 2;
const PUMP_INTERVAL: Duration = Duration::from_millis(10);
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

enum PumpCommand {
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Handle to a running capture thread. Dropping it stops the device stream.
pub struct MicCapture {
    active: Arc<AtomicBool>,
    commands: mpsc::Sender<PumpCommand>,
    worker: Option<JoinHandle<()>>,
}

impl MicCapture {
    /// Opens the input device on a new thread. `on_frame` receives PCM16 LE
    /// mono frames of `frame_samples` samples at `target_rate`, but only
    /// between `start()` and `stop()`.
    pub fn spawn<F>(
        device_name: Option<String>,
        target_rate: u32,
        frame_samples: usize,
        on_frame: F,
    ) -> anyhow::Result<Self>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        let (commands_tx, commands_rx) = mpsc::channel::<PumpCommand>();

        let thread_active = active.clone();
        let worker = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let pipeline = match CapturePipeline::open(
                    device_name.as_deref(),
                    target_rate,
                    frame_samples,
                    thread_active,
                ) {
                    Ok(pipeline) => {
                        let _ = ready_tx.send(Ok(()));
                        pipeline
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                pipeline.pump(commands_rx, on_frame);
            })?;

        ready_rx
            .recv()
            .context("capture thread exited during setup")??;

        Ok(Self {
            active,
            commands: commands_tx,
            worker: Some(worker),
        })
    }

    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stops keeping samples. Returns once the buffered rest of the
    /// utterance has gone to `on_frame`.
    pub fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        if self.commands.send(PumpCommand::Flush(done_tx)).is_err() {
            return;
        }
        if done_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
            tracing::warn!("capture pump did not flush within {:?}", FLUSH_TIMEOUT);
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
        let _ = self.commands.send(PumpCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("capture thread panicked");
            }
        }
    }
}

struct CapturePipeline {
    _stream: cpal::Stream,
    consumer: HeapCons<f32>,
    channels: usize,
    assembler: FrameAssembler,
    active: Arc<AtomicBool>,
}

impl CapturePipeline {
    fn open(
        device_name: Option<&str>,
        target_rate: u32,
        frame_samples: usize,
        active: Arc<AtomicBool>,
    ) -> anyhow::Result<Self> {
        let input = crate::device::get_or_default_input(device_name)?;
        let default_config = input
            .default_input_config()
            .context("failed to get default input config")?;
        let input_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        tracing::info!(
            "input: device={:?}, config={:?}",
            input.name().unwrap_or_default(),
            &input_config
        );

        let channels = input_config.channels as usize;
        let input_rate = input_config.sample_rate.0;
        let ring = audio::shared_buffer(input_rate as usize * channels * RING_SECONDS);
        let (producer, consumer) = ring.split();

        let stream = input.build_input_stream(
            &input_config,
            input_data_fn(producer, active.clone()),
            move |err| tracing::error!("an error occurred on input stream: {}", err),
            None,
        )?;
        stream.play()?;

        let resampler = if input_rate == target_rate {
            None
        } else {
            Some(audio::create_resampler(
                input_rate as f64,
                target_rate as f64,
                INPUT_CHUNK_SIZE,
            )?)
        };

        Ok(Self {
            _stream: stream,
            consumer,
            channels,
            assembler: FrameAssembler::new(resampler, frame_samples),
            active,
        })
    }

    fn pump<F>(mut self, commands: mpsc::Receiver<PumpCommand>, mut on_frame: F)
    where
        F: FnMut(Vec<u8>),
    {
        let mut scratch = vec![0.0f32; INPUT_CHUNK_SIZE * self.channels];

        loop {
            match commands.recv_timeout(PUMP_INTERVAL) {
                Ok(PumpCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(PumpCommand::Flush(done)) => {
                    self.drain_input(&mut scratch);
                    self.assembler.flush(&mut on_frame);
                    let _ = done.send(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.active.load(Ordering::SeqCst) {
                        self.drain_input(&mut scratch);
                        self.assembler.emit_whole(&mut on_frame);
                    }
                }
            }
        }
        tracing::debug!("capture pump stopped");
    }

    fn drain_input(&mut self, scratch: &mut [f32]) {
        loop {
            let whole_frames = (self.consumer.occupied_len() / self.channels) * self.channels;
            let take = whole_frames.min(scratch.len());
            if take == 0 {
                break;
            }
            let n = self.consumer.pop_slice(&mut scratch[..take]);
            self.assembler.push(&audio::downmix(&scratch[..n], self.channels));
        }
    }
}

/// Turns mono device samples into wire frames of `frame_samples` samples.
struct FrameAssembler {
    resampler: Option<FastFixedIn<f32>>,
    frame_samples: usize,
    pending: Vec<f32>,
    out: Vec<f32>,
}

impl FrameAssembler {
    fn new(resampler: Option<FastFixedIn<f32>>, frame_samples: usize) -> Self {
        Self {
            resampler,
            frame_samples,
            pending: Vec::with_capacity(INPUT_CHUNK_SIZE * 2),
            out: Vec::with_capacity(frame_samples * 2),
        }
    }

    fn push(&mut self, mono: &[f32]) {
        self.pending.extend_from_slice(mono);
        match self.resampler.as_mut() {
            None => self.out.append(&mut self.pending),
            Some(resampler) => {
                while self.pending.len() >= INPUT_CHUNK_SIZE {
                    let block: Vec<f32> = self.pending.drain(..INPUT_CHUNK_SIZE).collect();
                    match resampler.process(&[block.as_slice()], None) {
                        Ok(resampled) => {
                            if let Some(mono) = resampled.first() {
                                self.out.extend_from_slice(mono);
                            }
                        }
                        Err(e) => tracing::warn!("failed to resample input block: {}", e),
                    }
                }
            }
        }
    }

    fn emit_whole<F: FnMut(Vec<u8>)>(&mut self, on_frame: &mut F) {
        while self.out.len() >= self.frame_samples {
            let frame: Vec<f32> = self.out.drain(..self.frame_samples).collect();
            on_frame(frame.to_binary());
        }
    }

    /// Emits every whole frame and then the shorter remainder, leaving the
    /// assembler empty for the next utterance.
    fn flush<F: FnMut(Vec<u8>)>(&mut self, on_frame: &mut F) {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.pending.is_empty() {
                match resampler.process_partial(Some(&[self.pending.as_slice()]), None) {
                    Ok(resampled) => {
                        if let Some(mono) = resampled.first() {
                            self.out.extend_from_slice(mono);
                        }
                    }
                    Err(e) => tracing::warn!("failed to resample final input block: {}", e),
                }
            }
            resampler.reset();
        }
        self.pending.clear();

        self.emit_whole(on_frame);
        if !self.out.is_empty() {
            on_frame(self.out.to_binary());
            self.out.clear();
        }
    }
}

fn input_data_fn(
    mut producer: HeapProd<f32>,
    active: Arc<AtomicBool>,
) -> impl FnMut(&[f32], &cpal::InputCallbackInfo) + Send + 'static {
    move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if !active.load(Ordering::Relaxed) {
            return;
        }
        // Overflow drops the newest samples; the pump drains every few ms.
        let _ = producer.push_slice(data);
    }
}
