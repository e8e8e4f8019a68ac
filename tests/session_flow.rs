mod common;

use std::sync::Arc;

use reading_assistant_client::types::events::server::{ErrorEvent, SessionInitializedEvent};
use reading_assistant_client::types::{Channel, ClientMessage, ServerMessage, SessionStatus};
use reading_assistant_client::{Command, SessionHandle, TransportError, TransportEvent};

use common::{reading_session, session, settle, SESSION_ID};

#[tokio::test]
async fn upload_connect_and_start_reading() {
    let (mut session, recorder) = session();
    let mut seen = vec![session.status()];

    session.upload_document("chapter.txt".to_string(), b"It was a dark night.".to_vec());
    seen.push(session.status());

    settle(&mut session).await;
    seen.push(session.status());
    assert_eq!(recorder.sent(), vec![ClientMessage::init(SESSION_ID)]);

    recorder.server(ServerMessage::SessionInitialized(SessionInitializedEvent::new(SESSION_ID)));
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Connecting);

    recorder.server(ServerMessage::ReadingStarted);
    settle(&mut session).await;
    seen.push(session.status());

    assert_eq!(
        seen,
        vec![
            SessionStatus::Idle,
            SessionStatus::Uploading,
            SessionStatus::Connecting,
            SessionStatus::Reading
        ]
    );
    assert!(session.is_interruptible());
}

#[tokio::test]
async fn sentinel_then_frames_play_back_to_back() {
    let (mut session, recorder) = reading_session().await;

    recorder.audio(&[]);
    recorder.audio(&[1, 1]);
    recorder.audio(&[2, 2]);
    recorder.audio(&[3, 3]);
    settle(&mut session).await;
    assert_eq!(session.now_playing(), Some(Channel::Reading));

    recorder.finish_current();
    settle(&mut session).await;
    recorder.finish_current();
    settle(&mut session).await;
    recorder.finish_current();
    settle(&mut session).await;

    assert_eq!(recorder.played(), vec![vec![1, 1], vec![2, 2], vec![3, 3]]);
    assert_eq!(session.now_playing(), None);
}

#[tokio::test]
async fn answer_plays_before_buffered_narration() {
    let (mut session, recorder) = reading_session().await;
    recorder.audio(&[1]);
    recorder.audio(&[2]);
    recorder.audio(&[3]);
    settle(&mut session).await;
    assert_eq!(session.queued(Channel::Reading), 2);

    recorder.server(ServerMessage::AnsweringStarted);
    recorder.audio(&[42]);
    settle(&mut session).await;

    assert_eq!(session.status(), SessionStatus::Answering);
    assert_eq!(session.now_playing(), Some(Channel::Answering));
    assert_eq!(recorder.played().last(), Some(&vec![42]));
    assert_eq!(session.queued(Channel::Reading), 3, "narration is held, not dropped");

    recorder.server(ServerMessage::AnsweringEnded);
    recorder.finish_current();
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Listening);
    assert_eq!(session.now_playing(), None, "narration stays gated while listening");

    recorder.server(ServerMessage::ReadingStarted);
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Reading);
    assert_eq!(recorder.played().last(), Some(&vec![1]));
}

#[tokio::test]
async fn pause_and_resume_replays_interrupted_chunk() {
    let (mut session, recorder) = reading_session().await;
    recorder.audio(&[7, 7, 7]);
    recorder.audio(&[8, 8, 8]);
    settle(&mut session).await;

    session.pause_reading();
    assert_eq!(session.status(), SessionStatus::Paused);
    assert_eq!(session.now_playing(), None);

    session.resume_reading();
    assert_eq!(session.status(), SessionStatus::Reading);
    assert_eq!(recorder.played(), vec![vec![7, 7, 7], vec![7, 7, 7]]);

    let sent = recorder.sent();
    assert_eq!(
        sent[1..],
        [ClientMessage::PauseReading, ClientMessage::ResumeReading]
    );
}

#[tokio::test]
async fn close_while_answering_tears_down() {
    let (mut session, recorder) = reading_session().await;
    recorder.audio(&[1]);
    recorder.audio(&[2]);
    recorder.server(ServerMessage::AnsweringStarted);
    recorder.audio(&[3]);
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Answering);

    recorder.transport(TransportEvent::Close { reason: None });
    settle(&mut session).await;

    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.queued(Channel::Reading), 0);
    assert_eq!(session.queued(Channel::Answering), 0);
    assert_eq!(session.now_playing(), None);
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test]
async fn transport_error_is_surfaced() {
    let (mut session, recorder) = reading_session().await;
    let snapshots = session.subscribe();

    let fault = tokio_tungstenite::tungstenite::Error::ConnectionClosed;
    recorder.transport(TransportEvent::Error(Arc::new(TransportError::Connection(fault))));
    settle(&mut session).await;

    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn talk_cycle_sends_voice_between_interrupt_markers() {
    let (mut session, recorder) = reading_session().await;
    recorder.audio(&[5]);
    settle(&mut session).await;

    session.start_recording();
    assert_eq!(session.status(), SessionStatus::Listening);
    assert_eq!(session.now_playing(), None);

    recorder.capture_frame(&[0x10, 0x00]);
    recorder.capture_frame(&[0x20, 0x00]);
    settle(&mut session).await;
    session.stop_recording_and_send();
    assert_eq!(session.status(), SessionStatus::Processing);

    assert_eq!(recorder.audio_frames(), vec![vec![0x10, 0x00], vec![0x20, 0x00]]);
    assert_eq!(
        recorder.sent()[1..],
        [ClientMessage::InterruptStarted, ClientMessage::InterruptEnded]
    );

    // Audio after the question belongs to the answer.
    recorder.audio(&[6]);
    settle(&mut session).await;
    assert_eq!(session.now_playing(), Some(Channel::Answering));
    assert_eq!(session.queued(Channel::Reading), 1);
}

#[tokio::test]
async fn voice_still_queued_at_release_goes_out_before_interrupt_ended() {
    let (mut session, recorder) = reading_session().await;
    session.start_recording();

    // Frames the session has not picked up yet, plus the partial frame the
    // microphone holds when the button is released.
    recorder.capture_frame(&[0x10, 0x00]);
    recorder.capture_frame(&[0x20, 0x00]);
    recorder.hold_tail(&[0x30]);
    session.stop_recording_and_send();

    assert_eq!(
        recorder.wire(),
        vec!["init", "interrupt_started", "audio", "audio", "audio", "interrupt_ended"]
    );
    assert_eq!(
        recorder.audio_frames(),
        vec![vec![0x10, 0x00], vec![0x20, 0x00], vec![0x30]]
    );

    // Nothing is left over to leak out after the marker.
    settle(&mut session).await;
    assert_eq!(recorder.wire().last(), Some(&"interrupt_ended"));
}

#[tokio::test]
async fn reading_end_survives_an_interruption() {
    let (mut session, recorder) = reading_session().await;
    recorder.audio(&[1]);
    recorder.server(ServerMessage::ReadingEnded);
    settle(&mut session).await;

    session.start_recording();
    session.stop_recording_and_send();
    recorder.server(ServerMessage::AnsweringStarted);
    recorder.audio(&[9]);
    recorder.server(ServerMessage::AnsweringEnded);
    settle(&mut session).await;
    recorder.finish_current();
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Listening);

    recorder.server(ServerMessage::ReadingStarted);
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Reading);

    recorder.finish_current();
    settle(&mut session).await;
    assert_eq!(session.status(), SessionStatus::Ended);
}

#[tokio::test]
async fn server_error_keeps_status() {
    let (mut session, recorder) = reading_session().await;
    recorder.server(ServerMessage::Error(ErrorEvent::new("Failed to generate answer.")));
    settle(&mut session).await;

    assert_eq!(session.status(), SessionStatus::Reading);
    assert_eq!(session.last_error(), Some("Failed to generate answer."));
}

#[tokio::test]
async fn handle_drives_session_task() {
    let (session, _recorder) = session();
    let (handle, task) = SessionHandle::spawn(session, 16);
    let mut snapshots = handle.watch();

    handle
        .upload_document("chapter.txt", b"Once upon a time.".to_vec())
        .await
        .unwrap();
    while snapshots.borrow_and_update().status != SessionStatus::Connecting {
        snapshots.changed().await.unwrap();
    }

    handle.send(Command::Disconnect).await.unwrap();
    while snapshots.borrow_and_update().status != SessionStatus::Idle {
        snapshots.changed().await.unwrap();
    }

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(handle.pause_reading().await.is_err());
}
