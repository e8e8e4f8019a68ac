//! The session state machine.
//!
//! A [`Session`] binds one transport and one playback scheduler to a
//! [`SessionStatus`]. Everything that can change the status arrives as a
//! [`SessionEvent`] and is applied on a single task, one event at a time.

use tokio::sync::{mpsc, watch};

use crate::client::{Transport, TransportEvent, TransportRx};
use crate::playback::{PlaybackEvent, PlaybackRx, Scheduler};
use crate::types::{Channel, ClientMessage, ServerMessage, SessionStatus};

mod backend;
mod capture;
mod handle;
mod upload;

pub use backend::{Backend, LiveBackend};
pub use capture::{FrameCallback, VoiceCapture};
pub use handle::{Command, SessionHandle};
pub use upload::{DocumentUploader, HttpUploader, UploadError};

#[derive(Debug)]
pub enum SessionEvent {
    Transport(TransportEvent),
    Playback(PlaybackEvent),
    Drained(Channel),
    Uploaded(Result<String, String>),
    Captured(Vec<u8>),
}

/// What presentation code observes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub is_recording: bool,
    pub last_error: Option<String>,
}

/// Connection-scoped state, created on connect and dropped on teardown.
struct Live {
    transport: Box<dyn Transport>,
    transport_rx: TransportRx,
    scheduler: Scheduler,
    playback_rx: PlaybackRx,
}

/// Reading chunks heard for one session id. Survives reconnects so the
/// index keeps counting from where the last connection stopped.
#[derive(Debug, Default)]
struct Progress {
    session_id: Option<String>,
    sentence_index: u64,
}

pub struct Session<B: Backend> {
    backend: B,
    status: SessionStatus,
    session_id: Option<String>,
    interruptible: bool,
    is_recording: bool,
    reading_ended: bool,
    reading_seen: bool,
    preamble_chunks: u64,
    progress: Progress,
    last_error: Option<String>,
    live: Option<Live>,
    capture: Option<Box<dyn VoiceCapture>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: watch::Sender<Snapshot>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(Snapshot::default());
        Self {
            backend,
            status: SessionStatus::Idle,
            session_id: None,
            interruptible: false,
            is_recording: false,
            reading_ended: false,
            reading_seen: false,
            preamble_chunks: 0,
            progress: Progress::default(),
            last_error: None,
            live: None,
            capture: None,
            events_tx,
            events_rx,
            snapshot,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last `sentence_index` reported with `update_progress`.
    pub fn sentence_index(&self) -> u64 {
        self.progress.sentence_index
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Chunks waiting on `channel`. Zero while disconnected.
    pub fn queued(&self, channel: Channel) -> usize {
        self.live
            .as_ref()
            .map_or(0, |live| live.scheduler.queued(channel))
    }

    pub fn now_playing(&self) -> Option<Channel> {
        self.live
            .as_ref()
            .and_then(|live| live.scheduler.now_playing_channel())
    }

    /// Waits for the next event from any live source.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match self.live.as_mut() {
            Some(live) => tokio::select! {
                Some(event) = live.transport_rx.recv() => Some(SessionEvent::Transport(event)),
                Some(event) = live.playback_rx.recv() => Some(SessionEvent::Playback(event)),
                event = self.events_rx.recv() => event,
            },
            None => self.events_rx.recv().await,
        }
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(event) => self.on_transport(event),
            SessionEvent::Playback(event) => self.on_playback(event),
            SessionEvent::Drained(channel) => self.on_drained(channel),
            SessionEvent::Uploaded(result) => self.on_uploaded(result),
            SessionEvent::Captured(frame) => {
                if let Some(live) = self.live.as_mut() {
                    live.transport.send_audio(frame);
                }
            }
        }
    }

    /// Starts uploading a document. The session connects once the server
    /// has assigned a session id.
    pub fn upload_document(&mut self, file_name: String, contents: Vec<u8>) {
        if self.status != SessionStatus::Idle {
            tracing::warn!("upload ignored while {}", self.status);
            return;
        }
        self.last_error = None;
        self.set_status(SessionStatus::Uploading);

        let uploader = self.backend.uploader();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = uploader
                .upload(file_name, contents)
                .await
                .map_err(|e| e.to_string());
            let _ = events.send(SessionEvent::Uploaded(result));
        });
    }

    /// Opens the connection for an existing session id.
    pub fn connect(&mut self, session_id: &str) {
        if self.live.is_some() {
            tracing::warn!("already connected, ignoring connect");
            return;
        }
        self.session_id = Some(session_id.to_string());
        if self.progress.session_id.as_deref() != Some(session_id) {
            self.progress = Progress {
                session_id: Some(session_id.to_string()),
                sentence_index: 0,
            };
        }

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let sink = match self.backend.sink(playback_tx.clone()) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("failed to open audio output: {:#}", e);
                self.last_error = Some(e.to_string());
                self.session_id = None;
                self.set_status(SessionStatus::Idle);
                return;
            }
        };
        let decoder = self.backend.decoder(sink.sample_rate());
        let scheduler = Scheduler::new(sink, decoder, playback_tx);
        let mut transport = self.backend.transport(transport_tx);

        self.set_status(SessionStatus::Connecting);
        transport.connect();
        self.live = Some(Live {
            transport,
            transport_rx,
            scheduler,
            playback_rx,
        });
    }

    pub fn disconnect(&mut self) {
        tracing::info!("disconnecting");
        self.teardown();
    }

    pub fn pause_reading(&mut self) {
        if self.status != SessionStatus::Reading {
            tracing::debug!("pause ignored while {}", self.status);
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.scheduler.pause();
        live.scheduler.set_channel_gate(Channel::Reading, false);
        live.transport.send(ClientMessage::PauseReading);
        self.interruptible = false;
        self.set_status(SessionStatus::Paused);
    }

    pub fn resume_reading(&mut self) {
        if self.status != SessionStatus::Paused {
            tracing::debug!("resume ignored while {}", self.status);
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.transport.send(ClientMessage::ResumeReading);
        self.enter_reading();
    }

    /// Push-to-talk start. Ignored unless the session is interruptible.
    pub fn start_recording(&mut self) {
        if !self.interruptible || self.is_recording {
            tracing::debug!("start recording ignored while {}", self.status);
            return;
        }
        if self.live.is_none() {
            return;
        }
        if self.capture.is_none() {
            let events = self.events_tx.clone();
            let on_frame: capture::FrameCallback = Box::new(move |frame| {
                let _ = events.send(SessionEvent::Captured(frame));
            });
            match self.backend.capture(on_frame) {
                Ok(capture) => self.capture = Some(capture),
                Err(e) => {
                    tracing::error!("failed to open microphone: {:#}", e);
                    self.last_error = Some(e.to_string());
                    self.publish();
                    return;
                }
            }
        }

        if let Some(live) = self.live.as_mut() {
            live.scheduler.pause();
            live.scheduler.set_channel_gate(Channel::Reading, false);
            live.transport.send(ClientMessage::InterruptStarted);
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.start();
        }
        self.interruptible = false;
        self.is_recording = true;
        self.set_status(SessionStatus::Listening);
    }

    /// Push-to-talk end. The server answers with `answering_started`.
    ///
    /// The server only keeps voice that arrives before `interrupt_ended`, so
    /// every frame the capture produced is written out first.
    pub fn stop_recording_and_send(&mut self) {
        if !self.is_recording {
            return;
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
        self.is_recording = false;
        self.flush_captured();
        if let Some(live) = self.live.as_mut() {
            live.transport.send(ClientMessage::InterruptEnded);
        }
        if self.status == SessionStatus::Listening {
            self.set_status(SessionStatus::Processing);
        } else {
            self.publish();
        }
    }

    /// Sends queued voice frames now. Other queued events go back on the
    /// queue in their original order.
    fn flush_captured(&mut self) {
        let mut requeue = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SessionEvent::Captured(frame) => {
                    if let Some(live) = self.live.as_mut() {
                        live.transport.send_audio(frame);
                    }
                }
                other => requeue.push(other),
            }
        }
        for event in requeue {
            let _ = self.events_tx.send(event);
        }
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                let Some(session_id) = self.session_id.clone() else {
                    return;
                };
                tracing::info!("connection open, initializing session {}", session_id);
                if let Some(live) = self.live.as_mut() {
                    live.transport.send(ClientMessage::init(&session_id));
                }
            }
            TransportEvent::Close { reason } => {
                tracing::info!("connection closed: {:?}", reason);
                self.teardown();
            }
            TransportEvent::Error(e) => {
                tracing::error!("transport error: {}", e);
                self.last_error = Some(e.to_string());
                self.teardown();
            }
            TransportEvent::Audio(bytes) => {
                let channel = if self.status.expects_answer_audio() {
                    Channel::Answering
                } else {
                    Channel::Reading
                };
                // The greeting arrives before narration starts.
                if channel == Channel::Reading && !self.reading_seen && !bytes.is_empty() {
                    self.preamble_chunks += 1;
                }
                if let Some(live) = self.live.as_mut() {
                    live.scheduler.enqueue(bytes, channel);
                }
            }
            TransportEvent::Server(message) => self.on_server(message),
        }
    }

    fn on_server(&mut self, message: ServerMessage) {
        tracing::debug!("{} while {}", message.kind(), self.status);
        match message {
            ServerMessage::SessionInitialized(event) => {
                tracing::info!("session initialized: {}", event.session_id());
            }
            ServerMessage::Error(event) => {
                tracing::warn!("server error: {}", event.message());
                self.last_error = Some(event.message().to_string());
                self.publish();
            }
            ServerMessage::ReadingStarted => {
                if self.status.is_connected() {
                    self.reading_seen = true;
                    self.enter_reading();
                }
            }
            ServerMessage::ReadingPaused => {
                if self.status == SessionStatus::Reading {
                    if let Some(live) = self.live.as_mut() {
                        live.scheduler.pause();
                        live.scheduler.set_channel_gate(Channel::Reading, false);
                    }
                    self.interruptible = false;
                    self.set_status(SessionStatus::Paused);
                }
            }
            ServerMessage::ReadingEnded => {
                self.reading_ended = true;
                if self.status == SessionStatus::Reading {
                    self.arm_drain(Channel::Reading);
                }
            }
            ServerMessage::AnsweringStarted => {
                if self.status.is_connected() {
                    if let Some(live) = self.live.as_mut() {
                        live.scheduler.set_channel_gate(Channel::Reading, false);
                    }
                    self.interruptible = false;
                    self.set_status(SessionStatus::Answering);
                }
            }
            ServerMessage::AnsweringEnded => {
                if self.status == SessionStatus::Answering {
                    self.arm_drain(Channel::Answering);
                }
            }
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if live.scheduler.handle_event(event) != Some(Channel::Reading) {
            return;
        }
        if live.scheduler.played(Channel::Reading) <= self.preamble_chunks {
            tracing::debug!("greeting finished");
            return;
        }
        if let Some(session_id) = self.session_id.as_deref() {
            self.progress.sentence_index += 1;
            live.transport.send(ClientMessage::update_progress(
                session_id,
                self.progress.sentence_index,
            ));
        }
    }

    fn on_drained(&mut self, channel: Channel) {
        match channel {
            Channel::Reading if self.status == SessionStatus::Reading && self.reading_ended => {
                tracing::info!("narration finished");
                self.interruptible = false;
                self.set_status(SessionStatus::Ended);
            }
            Channel::Answering if self.status == SessionStatus::Answering => {
                self.interruptible = true;
                self.set_status(SessionStatus::Listening);
            }
            _ => tracing::debug!("ignoring {} drain while {}", channel, self.status),
        }
    }

    fn on_uploaded(&mut self, result: Result<String, String>) {
        if self.status != SessionStatus::Uploading {
            tracing::debug!("upload result ignored while {}", self.status);
            return;
        }
        match result {
            Ok(session_id) => {
                tracing::info!("upload complete, session {}", session_id);
                self.connect(&session_id);
            }
            Err(e) => {
                tracing::error!("upload failed: {}", e);
                self.last_error = Some(e);
                self.set_status(SessionStatus::Idle);
            }
        }
    }

    fn enter_reading(&mut self) {
        if let Some(live) = self.live.as_mut() {
            live.scheduler.set_channel_gate(Channel::Reading, true);
        }
        self.interruptible = true;
        self.set_status(SessionStatus::Reading);
        if self.reading_ended {
            self.arm_drain(Channel::Reading);
        }
    }

    fn arm_drain(&mut self, channel: Channel) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let events = self.events_tx.clone();
        live.scheduler.on_drain(channel, move || {
            let _ = events.send(SessionEvent::Drained(channel));
        });
    }

    fn teardown(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.scheduler.stop_and_clear();
            live.transport.close();
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
        self.capture = None;
        self.session_id = None;
        self.interruptible = false;
        self.is_recording = false;
        self.reading_ended = false;
        self.reading_seen = false;
        self.preamble_chunks = 0;
        self.set_status(SessionStatus::Idle);
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            tracing::info!("status: {} -> {}", self.status, status);
            self.status = status;
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            status: self.status,
            is_recording: self.is_recording,
            last_error: self.last_error.clone(),
        });
    }
}
