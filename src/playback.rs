//! Two-channel playback scheduling.
//!
//! Incoming binary frames are decoded on a worker and appended to either the
//! `reading` or the `answering` queue. Exactly one chunk sounds at a time.
//! Every time the sink reports a finished chunk the scheduler runs one
//! selection step: `answering` first, then `reading` if its gate is open.
//!
//! Sinks that support it are also handed the chunk the next step would pick,
//! so consecutive chunks sound without a gap. That handoff is redone whenever
//! the pick changes.
//!
//! The scheduler never runs on its own. Its owner feeds it the
//! [`PlaybackEvent`]s that arrive on the channel handed to [`Scheduler::new`].

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::types::Channel;

mod decoder;
mod sink;

pub use decoder::{AudioDecoder, DecodeError, EncodedAudioDecoder};
pub use sink::{AudioSink, CpalSink};

pub type PlaybackTx = mpsc::UnboundedSender<PlaybackEvent>;
pub type PlaybackRx = mpsc::UnboundedReceiver<PlaybackEvent>;

/// A decoded, ready-to-play buffer tagged with the queue it belongs to.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    id: u64,
    channel: Channel,
    samples: Arc<[f32]>,
}

impl AudioChunk {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }
}

#[derive(Debug)]
pub enum PlaybackEvent {
    /// A decode submitted under `epoch` has completed.
    Decoded {
        epoch: u64,
        channel: Channel,
        result: Result<Vec<f32>, DecodeError>,
    },
    /// The sink played the chunk started with this token to its end.
    ChunkFinished(u64),
    /// Run one selection step.
    Evaluate,
}

struct DecodeJob {
    epoch: u64,
    channel: Channel,
    bytes: Vec<u8>,
}

struct NowPlaying {
    chunk: AudioChunk,
    token: u64,
}

/// The chunk the sink will start by itself when the current one ends.
struct Lookahead {
    chunk_id: u64,
    token: u64,
}

struct DrainWaiter {
    channel: Channel,
    callback: Box<dyn FnOnce() + Send>,
}

pub struct Scheduler {
    sink: Box<dyn AudioSink>,
    events: PlaybackTx,
    decode_tx: mpsc::UnboundedSender<DecodeJob>,
    queues: [VecDeque<AudioChunk>; 2],
    gates: [bool; 2],
    pending_decodes: [usize; 2],
    now_playing: Option<NowPlaying>,
    lookahead: Option<Lookahead>,
    drain_waiter: Option<DrainWaiter>,
    epoch: u64,
    next_chunk_id: u64,
    next_token: u64,
    chunks_played: u64,
    played: [u64; 2],
}

impl Scheduler {
    /// Creates a scheduler and starts its decode worker. Must be called from
    /// within a tokio runtime.
    pub fn new(sink: Box<dyn AudioSink>, decoder: Arc<dyn AudioDecoder>, events: PlaybackTx) -> Self {
        let (decode_tx, decode_rx) = mpsc::unbounded_channel();
        tokio::spawn(decode_worker(decoder, decode_rx, events.clone()));

        Self {
            sink,
            events,
            decode_tx,
            queues: [VecDeque::new(), VecDeque::new()],
            gates: [true, true],
            pending_decodes: [0, 0],
            now_playing: None,
            lookahead: None,
            drain_waiter: None,
            epoch: 0,
            next_chunk_id: 0,
            next_token: 0,
            chunks_played: 0,
            played: [0, 0],
        }
    }

    /// Submits a binary frame for `channel`. A zero-length frame only asks
    /// for a playback attempt.
    pub fn enqueue(&mut self, bytes: Vec<u8>, channel: Channel) {
        if bytes.is_empty() {
            tracing::debug!("sentinel frame on {}", channel);
            self.step();
            return;
        }
        self.pending_decodes[channel.index()] += 1;
        let job = DecodeJob {
            epoch: self.epoch,
            channel,
            bytes,
        };
        if self.decode_tx.send(job).is_err() {
            tracing::error!("decode worker gone, dropping {} frame", channel);
            self.pending_decodes[channel.index()] -= 1;
        }
    }

    /// Allows or forbids selecting `channel`. Closing the gate of the channel
    /// that is sounding pauses it; opening a gate resumes playback.
    pub fn set_channel_gate(&mut self, channel: Channel, allowed: bool) {
        self.gates[channel.index()] = allowed;
        if allowed {
            self.step();
        } else if self.now_playing_channel() == Some(channel) {
            self.pause();
        } else {
            self.prepare_next();
        }
    }

    /// Stops the sounding chunk and puts it back at the head of its queue.
    pub fn pause(&mut self) {
        let Some(current) = self.now_playing.take() else {
            return;
        };
        self.sink.stop();
        self.lookahead = None;
        tracing::debug!(
            "paused chunk {} on {}",
            current.chunk.id,
            current.chunk.channel
        );
        let channel = current.chunk.channel;
        self.queues[channel.index()].push_front(current.chunk);
    }

    /// Pauses and drops every queued chunk and every decode still in flight.
    pub fn stop_and_clear(&mut self) {
        self.pause();
        for queue in self.queues.iter_mut() {
            queue.clear();
        }
        self.epoch += 1;
        self.pending_decodes = [0, 0];
        self.drain_waiter = None;
        tracing::debug!("playback cleared, epoch {}", self.epoch);
    }

    /// Arms the single drain waiter, replacing any previous one. The callback
    /// runs at most once, from a later selection step, never from this call.
    pub fn on_drain<F>(&mut self, channel: Channel, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.drain_waiter.is_some() {
            tracing::debug!("replacing drain waiter with one on {}", channel);
        }
        self.drain_waiter = Some(DrainWaiter {
            channel,
            callback: Box::new(callback),
        });
        if self.now_playing.is_none() {
            let _ = self.events.send(PlaybackEvent::Evaluate);
        }
    }

    /// Applies one event. Returns the channel of a chunk that just finished
    /// playing, if any.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> Option<Channel> {
        match event {
            PlaybackEvent::Decoded {
                epoch,
                channel,
                result,
            } => {
                if epoch != self.epoch {
                    tracing::debug!("discarding stale {} decode", channel);
                    return None;
                }
                let pending = &mut self.pending_decodes[channel.index()];
                *pending = pending.saturating_sub(1);
                match result {
                    Ok(samples) => {
                        let chunk = AudioChunk {
                            id: self.next_chunk_id,
                            channel,
                            samples: samples.into(),
                        };
                        self.next_chunk_id += 1;
                        self.queues[channel.index()].push_back(chunk);
                    }
                    Err(e) => tracing::warn!("dropping {} frame: {}", channel, e),
                }
                self.step();
                None
            }
            PlaybackEvent::ChunkFinished(token) => {
                let is_current = self
                    .now_playing
                    .as_ref()
                    .is_some_and(|current| current.token == token);
                if !is_current {
                    return None;
                }
                let finished = self.now_playing.take()?;
                let channel = finished.chunk.channel;
                self.chunks_played += 1;
                self.played[channel.index()] += 1;
                self.step();
                Some(channel)
            }
            PlaybackEvent::Evaluate => {
                self.step();
                None
            }
        }
    }

    fn next_channel(&self) -> Option<Channel> {
        Channel::PRIORITY
            .into_iter()
            .find(|ch| self.gates[ch.index()] && !self.queues[ch.index()].is_empty())
    }

    fn step(&mut self) {
        if self.now_playing.is_none() {
            let next = self.next_channel();
            if let Some(chunk) = next.and_then(|ch| self.queues[ch.index()].pop_front()) {
                let token = match self.lookahead.take() {
                    Some(lookahead) if lookahead.chunk_id == chunk.id => lookahead.token,
                    _ => {
                        self.next_token += 1;
                        self.sink.play(self.next_token, chunk.samples.clone());
                        self.next_token
                    }
                };
                self.now_playing = Some(NowPlaying { chunk, token });
            }
        }
        self.prepare_next();

        let drained = self
            .drain_waiter
            .as_ref()
            .is_some_and(|waiter| self.is_drained(waiter.channel));
        if drained {
            if let Some(waiter) = self.drain_waiter.take() {
                tracing::debug!("{} drained", waiter.channel);
                (waiter.callback)();
            }
        }
    }

    /// Hands the sink whatever the next step would select.
    fn prepare_next(&mut self) {
        let Some(after) = self.now_playing.as_ref().map(|current| current.token) else {
            return;
        };
        let candidate = self
            .next_channel()
            .and_then(|ch| self.queues[ch.index()].front())
            .map(|chunk| (chunk.id, chunk.samples.clone()));

        let queued = self.lookahead.as_ref().map(|lookahead| lookahead.chunk_id);

        match (candidate, queued) {
            (Some((id, _)), Some(queued)) if queued == id => {}
            (Some((id, samples)), _) => {
                self.next_token += 1;
                let token = self.next_token;
                self.lookahead = self
                    .sink
                    .queue_next(after, token, samples)
                    .then_some(Lookahead { chunk_id: id, token });
            }
            (None, Some(_)) => {
                self.lookahead = None;
                if !self.sink.cancel_next() {
                    tracing::debug!("queued chunk already sounding, silencing it");
                    self.sink.stop();
                }
            }
            (None, None) => {}
        }
    }

    fn is_drained(&self, channel: Channel) -> bool {
        self.queues[channel.index()].is_empty()
            && self.pending_decodes[channel.index()] == 0
            && self.now_playing_channel() != Some(channel)
    }

    pub fn queued(&self, channel: Channel) -> usize {
        self.queues[channel.index()].len()
    }

    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some()
    }

    pub fn now_playing(&self) -> Option<&AudioChunk> {
        self.now_playing.as_ref().map(|current| &current.chunk)
    }

    pub fn now_playing_channel(&self) -> Option<Channel> {
        self.now_playing().map(AudioChunk::channel)
    }

    /// Chunks played to completion since creation.
    pub fn chunks_played(&self) -> u64 {
        self.chunks_played
    }

    pub fn played(&self, channel: Channel) -> u64 {
        self.played[channel.index()]
    }
}

async fn decode_worker(
    decoder: Arc<dyn AudioDecoder>,
    mut jobs: mpsc::UnboundedReceiver<DecodeJob>,
    events: PlaybackTx,
) {
    while let Some(job) = jobs.recv().await {
        let decoder = decoder.clone();
        let DecodeJob {
            epoch,
            channel,
            bytes,
        } = job;
        let result = match tokio::task::spawn_blocking(move || decoder.decode(&bytes)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("decode task failed: {}", e);
                Err(DecodeError::Empty)
            }
        };
        if events
            .send(PlaybackEvent::Decoded {
                epoch,
                channel,
                result,
            })
            .is_err()
        {
            break;
        }
    }
    tracing::debug!("decode worker stopped");
}
