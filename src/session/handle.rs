use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::session::{Backend, Session, Snapshot};

/// User intents, applied in order on the session task.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UploadDocument { file_name: String, contents: Vec<u8> },
    Connect { session_id: String },
    Disconnect,
    PauseReading,
    ResumeReading,
    StartRecording,
    StopRecordingAndSend,
    Shutdown,
}

/// Cheap, cloneable front for a session running on its own task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Moves `session` onto a new task. The task ends after `shutdown` or
    /// once every handle has been dropped.
    pub fn spawn<B: Backend>(session: Session<B>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (commands, commands_rx) = mpsc::channel(capacity.max(1));
        let snapshot = session.subscribe();
        let task = tokio::spawn(session.run(commands_rx));
        (Self { commands, snapshot }, task)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    pub async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|e| anyhow::anyhow!("session task stopped, dropped {:?}", e.0))
    }

    pub async fn upload_document(&self, file_name: &str, contents: Vec<u8>) -> anyhow::Result<()> {
        self.send(Command::UploadDocument {
            file_name: file_name.to_string(),
            contents,
        })
        .await
    }

    pub async fn connect(&self, session_id: &str) -> anyhow::Result<()> {
        self.send(Command::Connect {
            session_id: session_id.to_string(),
        })
        .await
    }

    pub async fn disconnect(&self) -> anyhow::Result<()> {
        self.send(Command::Disconnect).await
    }

    pub async fn pause_reading(&self) -> anyhow::Result<()> {
        self.send(Command::PauseReading).await
    }

    pub async fn resume_reading(&self) -> anyhow::Result<()> {
        self.send(Command::ResumeReading).await
    }

    pub async fn start_recording(&self) -> anyhow::Result<()> {
        self.send(Command::StartRecording).await
    }

    pub async fn stop_recording_and_send(&self) -> anyhow::Result<()> {
        self.send(Command::StopRecordingAndSend).await
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send(Command::Shutdown).await
    }
}

impl<B: Backend> Session<B> {
    /// Applies commands and events until shut down.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if command == Command::Shutdown {
                        break;
                    }
                    self.apply(command);
                }
                Some(event) = self.next_event() => self.handle(event),
            }
        }
        self.disconnect();
        tracing::debug!("session task stopped");
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::UploadDocument {
                file_name,
                contents,
            } => self.upload_document(file_name, contents),
            Command::Connect { session_id } => self.connect(&session_id),
            Command::Disconnect => self.disconnect(),
            Command::PauseReading => self.pause_reading(),
            Command::ResumeReading => self.resume_reading(),
            Command::StartRecording => self.start_recording(),
            Command::StopRecordingAndSend => self.stop_recording_and_send(),
            Command::Shutdown => {}
        }
    }
}
