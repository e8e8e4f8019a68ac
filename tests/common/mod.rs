#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reading_assistant_client::session::FrameCallback;
use reading_assistant_client::types::{ClientMessage, ServerMessage};
use reading_assistant_client::{
    AudioDecoder, AudioSink, Backend, DecodeError, DocumentUploader, PlaybackEvent, PlaybackTx,
    Session, Transport, TransportEvent, TransportTx, UploadError, VoiceCapture,
};

/// Shared view into everything the fakes saw.
#[derive(Clone, Default)]
pub struct Recorder {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    audio_frames: Arc<Mutex<Vec<Vec<u8>>>>,
    wire: Arc<Mutex<Vec<&'static str>>>,
    plays: Arc<Mutex<Vec<(u64, Vec<u8>)>>>,
    transport_tx: Arc<Mutex<Option<TransportTx>>>,
    playback_tx: Arc<Mutex<Option<PlaybackTx>>>,
    on_frame: Arc<Mutex<Option<FrameCallback>>>,
    tail: Arc<Mutex<Option<Vec<u8>>>>,
    closes: Arc<Mutex<usize>>,
}

impl Recorder {
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn audio_frames(&self) -> Vec<Vec<u8>> {
        self.audio_frames.lock().unwrap().clone()
    }

    /// Kinds of everything written to the socket in order, `audio` for
    /// binary frames.
    pub fn wire(&self) -> Vec<&'static str> {
        self.wire.lock().unwrap().clone()
    }

    /// Payloads handed to the sink, oldest first.
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.plays
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock().unwrap()
    }

    pub fn server(&self, message: ServerMessage) {
        self.transport(TransportEvent::Server(message));
    }

    pub fn audio(&self, bytes: &[u8]) {
        self.transport(TransportEvent::Audio(bytes.to_vec()));
    }

    pub fn transport(&self, event: TransportEvent) {
        let guard = self.transport_tx.lock().unwrap();
        guard.as_ref().expect("not connected").send(event).unwrap();
    }

    /// Simulates the output device reaching the end of the sounding chunk.
    pub fn finish_current(&self) {
        let token = self.plays.lock().unwrap().last().expect("nothing played").0;
        let guard = self.playback_tx.lock().unwrap();
        guard
            .as_ref()
            .expect("no sink")
            .send(PlaybackEvent::ChunkFinished(token))
            .unwrap();
    }

    /// Simulates the microphone delivering one frame.
    pub fn capture_frame(&self, frame: &[u8]) {
        let mut guard = self.on_frame.lock().unwrap();
        let on_frame = guard.as_mut().expect("capture not opened");
        on_frame(frame.to_vec());
    }

    /// A partial frame the microphone still holds when capture stops.
    pub fn hold_tail(&self, frame: &[u8]) {
        *self.tail.lock().unwrap() = Some(frame.to_vec());
    }
}

struct FakeTransport(Recorder);

impl Transport for FakeTransport {
    fn connect(&mut self) {
        self.0.transport(TransportEvent::Open);
    }

    fn send(&mut self, message: ClientMessage) {
        self.0.wire.lock().unwrap().push(message.kind());
        self.0.sent.lock().unwrap().push(message);
    }

    fn send_audio(&mut self, bytes: Vec<u8>) {
        self.0.wire.lock().unwrap().push("audio");
        self.0.audio_frames.lock().unwrap().push(bytes);
    }

    fn close(&mut self) {
        *self.0.closes.lock().unwrap() += 1;
    }
}

struct FakeSink(Recorder);

impl AudioSink for FakeSink {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn play(&mut self, token: u64, samples: Arc<[f32]>) {
        let bytes = samples.iter().map(|s| *s as u8).collect();
        self.0.plays.lock().unwrap().push((token, bytes));
    }

    fn stop(&mut self) {}
}

/// One sample per byte, so played chunks can be compared with sent frames.
struct ByteDecoder;

impl AudioDecoder for ByteDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
        Ok(bytes.iter().map(|b| *b as f32).collect())
    }
}

struct FixedUploader(String);

#[async_trait]
impl DocumentUploader for FixedUploader {
    async fn upload(&self, _file_name: String, contents: Vec<u8>) -> Result<String, UploadError> {
        if contents.is_empty() {
            return Err(UploadError::Status {
                status: 400,
                body: "Multipart form must include a file".to_string(),
            });
        }
        Ok(self.0.clone())
    }
}

struct FakeCapture(Recorder);

impl VoiceCapture for FakeCapture {
    fn start(&mut self) {}

    /// Hands over the held tail before returning, like the real pump flush.
    fn stop(&mut self) {
        if let Some(tail) = self.0.tail.lock().unwrap().take() {
            self.0.capture_frame(&tail);
        }
    }
}

pub struct FakeBackend {
    recorder: Recorder,
}

impl Backend for FakeBackend {
    fn transport(&self, events: TransportTx) -> Box<dyn Transport> {
        *self.recorder.transport_tx.lock().unwrap() = Some(events);
        Box::new(FakeTransport(self.recorder.clone()))
    }

    fn sink(&self, events: PlaybackTx) -> anyhow::Result<Box<dyn AudioSink>> {
        *self.recorder.playback_tx.lock().unwrap() = Some(events);
        Ok(Box::new(FakeSink(self.recorder.clone())))
    }

    fn decoder(&self, _output_rate: u32) -> Arc<dyn AudioDecoder> {
        Arc::new(ByteDecoder)
    }

    fn uploader(&self) -> Arc<dyn DocumentUploader> {
        Arc::new(FixedUploader(SESSION_ID.to_string()))
    }

    fn capture(&self, on_frame: FrameCallback) -> anyhow::Result<Box<dyn VoiceCapture>> {
        *self.recorder.on_frame.lock().unwrap() = Some(on_frame);
        Ok(Box::new(FakeCapture(self.recorder.clone())))
    }
}

pub const SESSION_ID: &str = "0b7e9c1a-2f4d-4c8e-9a6b-3d5f7e9c1a2f";

pub fn session() -> (Session<FakeBackend>, Recorder) {
    let recorder = Recorder::default();
    let backend = FakeBackend {
        recorder: recorder.clone(),
    };
    (Session::new(backend), recorder)
}

/// Applies events until the session has been quiet for a moment.
pub async fn settle(session: &mut Session<FakeBackend>) {
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(50), session.next_event()).await
    {
        session.handle(event);
    }
}

/// A session that has uploaded, connected and started narration.
pub async fn reading_session() -> (Session<FakeBackend>, Recorder) {
    let (mut session, recorder) = session();
    session.upload_document("chapter.txt".to_string(), b"Call me Ishmael.".to_vec());
    settle(&mut session).await;
    recorder.server(ServerMessage::ReadingStarted);
    settle(&mut session).await;
    (session, recorder)
}
