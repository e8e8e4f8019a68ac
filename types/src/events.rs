pub mod client;
pub mod server;

use client::*;
use server::*;

/// Control messages the client sends as JSON text frames.
///
/// Microphone audio is not part of this enum; it travels as raw binary frames.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "init")]
    Init(InitEvent),
    #[serde(rename = "interrupt_started")]
    InterruptStarted,
    #[serde(rename = "interrupt_ended")]
    InterruptEnded,
    #[serde(rename = "pause_reading")]
    PauseReading,
    #[serde(rename = "resume_reading")]
    ResumeReading,
    #[serde(rename = "update_progress")]
    UpdateProgress(UpdateProgressEvent),
}

impl ClientMessage {
    pub fn init(session_id: &str) -> Self {
        Self::Init(InitEvent::new(session_id))
    }

    pub fn update_progress(session_id: &str, sentence_index: u64) -> Self {
        Self::UpdateProgress(UpdateProgressEvent::new(session_id, sentence_index))
    }

    /// The wire tag, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::InterruptStarted => "interrupt_started",
            Self::InterruptEnded => "interrupt_ended",
            Self::PauseReading => "pause_reading",
            Self::ResumeReading => "resume_reading",
            Self::UpdateProgress(_) => "update_progress",
        }
    }
}

/// Control messages the server sends as JSON text frames.
///
/// Narration and answer audio arrive as raw binary frames alongside these.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session_initialized")]
    SessionInitialized(SessionInitializedEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "reading_started")]
    ReadingStarted,
    #[serde(rename = "reading_paused")]
    ReadingPaused,
    #[serde(rename = "reading_ended")]
    ReadingEnded,
    #[serde(rename = "answering_started")]
    AnsweringStarted,
    #[serde(rename = "answering_ended")]
    AnsweringEnded,
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionInitialized(_) => "session_initialized",
            Self::Error(_) => "error",
            Self::ReadingStarted => "reading_started",
            Self::ReadingPaused => "reading_paused",
            Self::ReadingEnded => "reading_ended",
            Self::AnsweringStarted => "answering_started",
            Self::AnsweringEnded => "answering_ended",
        }
    }
}
