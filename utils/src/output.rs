//! Chunk playback on an output device.
//!
//! The player shares a slot with the device callback holding the sounding
//! chunk and at most one queued chunk. When the sounding chunk runs out the
//! callback carries on with the queued one inside the same buffer. Finished
//! tokens go through a preallocated ring buffer and the player thread hands
//! them to `on_finished`, so the callback never allocates. Sequencing beyond
//! the one queued chunk belongs to the caller.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

const FINISHED_CAPACITY: usize = 64;
const NOTIFY_INTERVAL: Duration = Duration::from_millis(5);

struct Queued {
    token: u64,
    samples: Arc<[f32]>,
}

#[derive(Default)]
struct Slot {
    current: Option<Queued>,
    position: usize,
    next: Option<Queued>,
}

impl Slot {
    fn next_sample<F: FnMut(u64)>(&mut self, on_finished: &mut F) -> f32 {
        loop {
            let Some(current) = self.current.as_ref() else {
                return 0.0;
            };
            if let Some(&sample) = current.samples.get(self.position) {
                self.position += 1;
                return sample;
            }
            self.advance(on_finished);
        }
    }

    fn advance<F: FnMut(u64)>(&mut self, on_finished: &mut F) {
        if let Some(done) = self.current.take() {
            on_finished(done.token);
        }
        self.current = self.next.take();
        self.position = 0;
    }

    fn is_exhausted(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| self.position >= current.samples.len())
    }
}

/// Writes mono samples to every channel of `data`, moving on to the queued
/// chunk without a gap. A chunk ending on the last frame is reported in the
/// same call.
fn fill_frames<F: FnMut(u64)>(
    slot: &mut Slot,
    data: &mut [f32],
    channels: usize,
    mut on_finished: F,
) {
    for frame in data.chunks_mut(channels) {
        frame.fill(slot.next_sample(&mut on_finished));
    }
    while slot.is_exhausted() {
        slot.advance(&mut on_finished);
    }
}

pub struct ChunkPlayer {
    slot: Arc<Mutex<Slot>>,
    sample_rate: u32,
    shutdown: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ChunkPlayer {
    /// Opens the output device on its own thread with the device's default
    /// config. Mono chunks must already be at `sample_rate()`. `on_finished`
    /// runs on the player thread.
    pub fn spawn<F>(device_name: Option<String>, on_finished: F) -> anyhow::Result<Self>
    where
        F: Fn(u64) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Slot::default()));
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<u32>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (finished_tx, finished_rx) = HeapRb::<u64>::new(FINISHED_CAPACITY).split();

        let thread_slot = slot.clone();
        let worker = std::thread::Builder::new()
            .name("chunk-player".to_string())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), thread_slot, finished_tx) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // The stream lives on this thread until the handle is dropped.
                notify_finished(shutdown_rx, finished_rx, on_finished);
                drop(stream);
                tracing::debug!("output stream closed");
            })?;

        let sample_rate = ready_rx
            .recv()
            .context("output thread exited during setup")??;

        Ok(Self {
            slot,
            sample_rate,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Replaces whatever is sounding with `samples` and drops the queued chunk.
    pub fn play(&self, token: u64, samples: Arc<[f32]>) {
        match self.slot.lock() {
            Ok(mut slot) => {
                slot.current = Some(Queued { token, samples });
                slot.position = 0;
                slot.next = None;
            }
            Err(_) => tracing::error!("output slot poisoned, dropping chunk {}", token),
        }
    }

    /// Queues `samples` to start the moment the chunk played as `after` ends,
    /// replacing any previously queued chunk. Returns false if `after` is no
    /// longer the sounding chunk.
    pub fn queue_next(&self, after: u64, token: u64, samples: Arc<[f32]>) -> bool {
        let Ok(mut slot) = self.slot.lock() else {
            return false;
        };
        if slot.current.as_ref().map(|current| current.token) != Some(after) {
            return false;
        }
        slot.next = Some(Queued { token, samples });
        true
    }

    /// Drops the queued chunk. Returns false if it has already started.
    pub fn cancel_next(&self) -> bool {
        self.slot
            .lock()
            .map(|mut slot| slot.next.take().is_some())
            .unwrap_or(false)
    }

    /// Silences the output immediately. No completion is reported for the
    /// interrupted chunk.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.current = None;
            slot.position = 0;
            slot.next = None;
        }
    }
}

impl Drop for ChunkPlayer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("output thread panicked");
            }
        }
    }
}

fn notify_finished<F>(shutdown: mpsc::Receiver<()>, mut finished: HeapCons<u64>, on_finished: F)
where
    F: Fn(u64),
{
    loop {
        let stop = match shutdown.recv_timeout(NOTIFY_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        while let Some(token) = finished.try_pop() {
            on_finished(token);
        }
        if stop {
            break;
        }
    }
}

fn open_stream(
    device_name: Option<&str>,
    slot: Arc<Mutex<Slot>>,
    mut finished: HeapProd<u64>,
) -> anyhow::Result<(cpal::Stream, u32)> {
    let output = crate::device::get_or_default_output(device_name)?;
    let default_config = output
        .default_output_config()
        .context("failed to get default output config")?;
    let output_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        "output: device={:?}, config={:?}",
        output.name().unwrap_or_default(),
        &output_config
    );
    let output_channel_count = (output_config.channels as usize).max(1);

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let Ok(mut slot) = slot.try_lock() else {
            data.fill(0.0);
            return;
        };
        fill_frames(&mut slot, data, output_channel_count, |token| {
            // Full only if the player thread has stalled for a long time.
            let _ = finished.try_push(token);
        });
    };

    let stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("an error occurred on output stream: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((stream, output_config.sample_rate.0))
}
