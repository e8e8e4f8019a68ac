use std::sync::Arc;

use crate::client::{Client, Transport, TransportTx};
use crate::config::Config;
use crate::playback::{AudioDecoder, AudioSink, CpalSink, EncodedAudioDecoder, PlaybackTx};
use crate::session::capture::{FrameCallback, VoiceCapture};
use crate::session::upload::{DocumentUploader, HttpUploader};
use crate::types::audio::CLIENT_PCM16_SAMPLE_RATE;
use crate::utils::capture::{MicCapture, INPUT_CHUNK_SIZE};

/// Factory for everything a [`Session`](crate::Session) talks to.
///
/// Transport, sink and decoder are created per connection and dropped on
/// teardown. The capture device is opened on first use.
pub trait Backend: Send + 'static {
    fn transport(&self, events: TransportTx) -> Box<dyn Transport>;
    fn sink(&self, events: PlaybackTx) -> anyhow::Result<Box<dyn AudioSink>>;
    fn decoder(&self, output_rate: u32) -> Arc<dyn AudioDecoder>;
    fn uploader(&self) -> Arc<dyn DocumentUploader>;
    fn capture(&self, on_frame: FrameCallback) -> anyhow::Result<Box<dyn VoiceCapture>>;
}

/// Real network and audio devices.
pub struct LiveBackend {
    config: Config,
    input_device: Option<String>,
    output_device: Option<String>,
    uploader: Arc<HttpUploader>,
}

impl LiveBackend {
    pub fn new(config: Config) -> Self {
        let uploader = Arc::new(HttpUploader::new(&config));
        Self {
            config,
            input_device: None,
            output_device: None,
            uploader,
        }
    }

    pub fn with_input_device(mut self, name: Option<String>) -> Self {
        self.input_device = name;
        self
    }

    pub fn with_output_device(mut self, name: Option<String>) -> Self {
        self.output_device = name;
        self
    }
}

impl Backend for LiveBackend {
    fn transport(&self, events: TransportTx) -> Box<dyn Transport> {
        Box::new(Client::new(&self.config, events))
    }

    fn sink(&self, events: PlaybackTx) -> anyhow::Result<Box<dyn AudioSink>> {
        Ok(Box::new(CpalSink::open(self.output_device.clone(), events)?))
    }

    fn decoder(&self, output_rate: u32) -> Arc<dyn AudioDecoder> {
        Arc::new(EncodedAudioDecoder::new(output_rate))
    }

    fn uploader(&self) -> Arc<dyn DocumentUploader> {
        self.uploader.clone()
    }

    fn capture(&self, on_frame: FrameCallback) -> anyhow::Result<Box<dyn VoiceCapture>> {
        let capture = MicCapture::spawn(
            self.input_device.clone(),
            CLIENT_PCM16_SAMPLE_RATE,
            INPUT_CHUNK_SIZE,
            on_frame,
        )?;
        Ok(Box::new(capture))
    }
}
