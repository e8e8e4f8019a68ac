use std::sync::Arc;

use crate::playback::{PlaybackEvent, PlaybackTx};
use crate::utils::output::ChunkPlayer;

/// Where decoded chunks are sounded, one at a time.
///
/// `play` replaces anything currently sounding. A chunk that plays to its end
/// must be reported as [`PlaybackEvent::ChunkFinished`] carrying the same
/// token; a chunk cut short by `stop` must not be reported.
pub trait AudioSink: Send {
    fn sample_rate(&self) -> u32;
    fn play(&mut self, token: u64, samples: Arc<[f32]>);
    fn stop(&mut self);

    /// Starts `samples` as soon as the chunk played as `after` ends, without
    /// waiting for the caller. At most one chunk is queued; `play` and `stop`
    /// drop it. Returns false when the sink cannot do this or `after` is no
    /// longer sounding, in which case the caller plays the chunk itself.
    fn queue_next(&mut self, _after: u64, _token: u64, _samples: Arc<[f32]>) -> bool {
        false
    }

    /// Drops the chunk given to `queue_next`. Returns false if it has
    /// already started.
    fn cancel_next(&mut self) -> bool {
        true
    }
}

/// [`AudioSink`] backed by a cpal output stream.
pub struct CpalSink {
    player: ChunkPlayer,
}

impl CpalSink {
    pub fn open(device_name: Option<String>, events: PlaybackTx) -> anyhow::Result<Self> {
        let player = ChunkPlayer::spawn(device_name, move |token| {
            if events.send(PlaybackEvent::ChunkFinished(token)).is_err() {
                tracing::debug!("playback listener gone, chunk {} finished unobserved", token);
            }
        })?;
        Ok(Self { player })
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.player.sample_rate()
    }

    fn play(&mut self, token: u64, samples: Arc<[f32]>) {
        self.player.play(token, samples);
    }

    fn stop(&mut self) {
        self.player.stop();
    }

    fn queue_next(&mut self, after: u64, token: u64, samples: Arc<[f32]>) -> bool {
        self.player.queue_next(after, token, samples)
    }

    fn cancel_next(&mut self) -> bool {
        self.player.cancel_next()
    }
}
