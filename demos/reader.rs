use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use reading_assistant_client::types::SessionStatus;
use reading_assistant_client::{Config, LiveBackend, Session, SessionHandle};

#[derive(Parser, Debug)]
#[command(version, about = "Listen to a document and ask questions out loud")]
struct Args {
    /// Text document to upload and read.
    #[arg(required_unless_present = "session_id")]
    file: Option<PathBuf>,

    /// Join an existing session instead of uploading.
    #[arg(long)]
    session_id: Option<String>,

    #[arg(long)]
    input_device: Option<String>,

    #[arg(long)]
    output_device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(config.log_level()).into())
                .from_env_lossy(),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let capacity = config.channel_capacity();
    let backend = LiveBackend::new(config)
        .with_input_device(args.input_device)
        .with_output_device(args.output_device);
    let (handle, task) = SessionHandle::spawn(Session::new(backend), capacity);

    match (args.session_id, args.file) {
        (Some(session_id), _) => handle.connect(&session_id).await?,
        (None, Some(path)) => {
            let contents = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "untitled.txt".to_string());
            handle.upload_document(&file_name, contents).await?;
        }
        (None, None) => anyhow::bail!("nothing to read"),
    }

    let mut snapshots = handle.watch();
    tokio::spawn(async move {
        let mut last = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if last.as_ref() != Some(&snapshot) {
                let recording = if snapshot.is_recording { " [mic]" } else { "" };
                println!("status: {}{}", snapshot.status, recording);
                if let Some(error) = snapshot.last_error.as_deref() {
                    println!("error: {}", error);
                }
                last = Some(snapshot);
            }
        }
    });

    println!("t = talk/send, p = pause, r = resume, q = quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let snapshot = handle.snapshot();
        match line.trim() {
            "t" if snapshot.is_recording => handle.stop_recording_and_send().await?,
            "t" => handle.start_recording().await?,
            "p" => handle.pause_reading().await?,
            "r" => handle.resume_reading().await?,
            "q" => break,
            "" => {}
            other => println!("unknown command: {:?}", other),
        }
        if snapshot.status == SessionStatus::Ended {
            println!("finished reading, q to quit");
        }
    }

    handle.shutdown().await?;
    task.await?;
    Ok(())
}
