mod client;
mod config;
pub mod playback;
pub mod session;

pub use reading_assistant_types as types;
pub use reading_assistant_utils as utils;

pub use client::{
    Client, LinkState, Transport, TransportError, TransportEvent, TransportRx, TransportStats,
    TransportTx,
};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use playback::{
    AudioChunk, AudioDecoder, AudioSink, CpalSink, DecodeError, EncodedAudioDecoder,
    PlaybackEvent, PlaybackRx, PlaybackTx, Scheduler,
};
pub use session::{
    Backend, Command, DocumentUploader, HttpUploader, LiveBackend, Session, SessionEvent,
    SessionHandle, Snapshot, UploadError, VoiceCapture,
};
